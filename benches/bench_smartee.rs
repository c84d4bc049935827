#![allow(
    clippy::tests_outside_test_module,
    clippy::unwrap_used,
    reason = "benchmark"
)]

use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use handlebars::Handlebars;
use minijinja::Environment;
use serde_json::Value as Json;
use smartee::{Engine, Key, Params, SmarteeInterface, Value};

mod utils;

fn rendering_benchmark(c: &mut Criterion) {
    let contexts = utils::generate_random_contexts(100);
    let params: Vec<Params> = contexts.iter().map(create_params).collect();

    let mut engine = Engine::new();
    let template_content = include_str!("template_smartee.tpl");
    engine.add_template("profile", template_content).unwrap();

    let mut env = Environment::new();
    env.add_template("profile", include_str!("template_minijinja.jinja"))
        .unwrap();

    let mut handlebars = Handlebars::new();
    handlebars
        .register_template_string("profile", include_str!("template_handlebars.hbs"))
        .unwrap();

    // Every engine must agree on the visible content before being timed.
    for (context, params) in contexts.iter().zip(&params) {
        let smartee = squash(&engine.render("profile", Some(params)).unwrap());
        let jinja = squash(&env.get_template("profile").unwrap().render(context).unwrap());
        assert_eq!(smartee, jinja, "smartee and minijinja disagree");
    }

    utils::print_binary_size();

    let mut group = c.benchmark_group("Template Rendering");
    group.sample_size(50);

    group.bench_function("smartee_compile", |b| {
        b.iter(|| black_box(engine.compile("profile", template_content).unwrap()));
    });

    group.bench_function("smartee_render", |b| {
        b.iter(|| {
            for params in &params {
                black_box(engine.render("profile", Some(params)).unwrap());
            }
        });
    });

    group.bench_function("minijinja_render", |b| {
        b.iter(|| {
            let template = env.get_template("profile").unwrap();
            for context in &contexts {
                black_box(template.render(context).unwrap());
            }
        });
    });

    group.bench_function("handlebars_render", |b| {
        b.iter(|| {
            for context in &contexts {
                black_box(handlebars.render("profile", context).unwrap());
            }
        });
    });

    group.finish();
}

/// Output with all whitespace removed, for comparing engines.
fn squash(output: &str) -> String {
    output.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Top-level JSON object into render parameters.
fn create_params(json: &Json) -> Params {
    json.as_object()
        .into_iter()
        .flatten()
        .map(|(name, value)| (name.as_str(), to_value(value)))
        .collect()
}

fn to_value(json: &Json) -> Value {
    match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => n.as_i64().map_or_else(|| Value::Float(n.as_f64().unwrap_or_default()), Value::Int),
        Json::String(s) => Value::from(s.as_str()),
        Json::Array(items) => Value::list(items.iter().map(to_value)),
        Json::Object(map) => Value::Array(
            map.iter()
                .map(|(key, value)| (Key::from(key.as_str()), to_value(value)))
                .collect(),
        ),
    }
}

criterion_group!(benches, rendering_benchmark);
criterion_main!(benches);
