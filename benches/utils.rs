use rand::{Rng, SeedableRng, rngs::StdRng};
use serde_json::{Value, json};

/// `n` profile contexts, the same for every engine thanks to the fixed seed.
pub fn generate_random_contexts(n: usize) -> Vec<Value> {
    let mut rng = StdRng::seed_from_u64(42);

    (0..n)
        .map(|_| {
            let name = random_string(&mut rng, 5, 10);
            let items: Vec<Value> = (0..rng.random_range(0..10))
                .map(|_| {
                    json!({
                        "name": random_string(&mut rng, 3, 8),
                        "value": rng.random_range(10..1000),
                        "special": rng.random_bool(0.3),
                    })
                })
                .collect();

            json!({
                "user": {
                    "name": name,
                    "age": rng.random_range(18..80),
                    "active": rng.random_bool(0.7),
                },
                "items": items,
                "show_details": rng.random_bool(0.8),
                "has_access": rng.random_bool(0.6),
            })
        })
        .collect()
}

fn random_string(rng: &mut StdRng, min_len: usize, max_len: usize) -> String {
    let len = rng.random_range(min_len..=max_len);
    (0..len)
        .map(|_| char::from(b'a' + rng.random_range(0..26_u8)))
        .collect()
}

pub fn print_binary_size() {
    let binary_path = std::env::current_exe().unwrap();
    let size_bytes = std::fs::metadata(&binary_path).unwrap().len();
    #[allow(clippy::cast_precision_loss, reason = "display only")]
    let size_kb = size_bytes as f64 / 1024.0;

    println!("Binary size: {size_kb:.2} KB ({size_bytes} bytes)");
    println!("Binary path: {}", binary_path.display());
}
