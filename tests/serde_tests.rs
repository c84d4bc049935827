#[cfg(feature = "serde")]
mod serde_tests {
    use serde_json::json;
    use smartee::{
        CompileError, CompileErrorKind, ContentType, Engine, EngineConfig, Params,
        SmarteeInterface, Value,
    };

    #[derive(serde::Serialize)]
    struct Page {
        title: String,
        tags: Vec<String>,
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_content_type_serialization() {
        let serialized = serde_json::to_string(&ContentType::Xhtml).unwrap();
        assert_eq!(serialized, r#""xhtml""#);

        let deserialized: ContentType = serde_json::from_str(r#""text""#).unwrap();
        assert_eq!(deserialized, ContentType::Text);
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_engine_config_defaults_missing_fields() {
        let config: EngineConfig = serde_json::from_str(r#"{"content_type": "text"}"#).unwrap();
        assert_eq!(
            config,
            EngineConfig {
                content_type: ContentType::Text,
                ..EngineConfig::default()
            }
        );

        let serialized = serde_json::to_value(EngineConfig::default()).unwrap();
        assert_eq!(
            serialized,
            json!({"content_type": "html", "max_depth": 64, "notice_undefined": true})
        );
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_params_from_struct() {
        let page = Page {
            title: "Home".to_string(),
            tags: vec!["a".to_string(), "b".to_string()],
        };
        let params = Params::from_serialize(&page).unwrap();
        assert_eq!(params.get("title"), Some(&Value::from("Home")));
        assert_eq!(params.get("tags"), Some(&Value::list(["a", "b"])));

        let mut engine = Engine::new();
        engine
            .add_template("page", "{$title}:{foreach from=$tags item=t}{$t}{/foreach}")
            .unwrap();
        assert_eq!(engine.render("page", Some(&params)).unwrap(), "Home:ab");
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_params_must_be_a_map() {
        assert!(Params::from_serialize(&json!([1, 2])).is_err());
        assert!(Params::from_serialize(&json!({"n": 1.5})).is_ok());
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_compile_error_round_trip() {
        let mut engine = Engine::new();
        let error = engine.add_template("page", "\n{/if}").unwrap_err();
        let smartee::SmarteeError::Compile(error) = error else {
            panic!("expected a compile error");
        };

        let serialized = serde_json::to_value(&error).unwrap();
        assert_eq!(serialized["line"], json!(2));
        assert_eq!(serialized["notation"], json!("{/if}"));

        let deserialized: CompileError = serde_json::from_value(serialized).unwrap();
        assert_eq!(
            deserialized.kind,
            CompileErrorKind::UnexpectedTag {
                notation: "{/if}".to_string()
            }
        );
    }
}
