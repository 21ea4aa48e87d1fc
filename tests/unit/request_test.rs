//! Unit tests for request parsing and validation

use dotcanvas_ai_service::{
    api::types::{GenerationRequest, GenerationResponse, DEFAULT_NEGATIVE_PROMPT},
    config::LimitsConfig,
    pipeline::Sampler,
    AppError,
};

fn parse(json: &str) -> GenerationRequest {
    serde_json::from_str(json).unwrap()
}

#[test]
fn test_minimal_request_gets_defaults() {
    let params = parse(r#"{"prompt": "a red cube"}"#)
        .into_params(&LimitsConfig::default())
        .unwrap();

    assert_eq!(params.negative_prompt, DEFAULT_NEGATIVE_PROMPT);
    assert_eq!(params.width, 512);
    assert_eq!(params.height, 512);
    assert_eq!(params.steps, 30);
    assert_eq!(params.cfg_scale, 7.0);
    assert_eq!(params.sampler, Sampler::KEulerAncestral);
    assert_eq!(params.samples, 1);
}

#[test]
fn test_all_fields_parsed() {
    let params = parse(
        r#"{"prompt": " harbor at dusk ", "negative_prompt": "people", "width": 768,
            "height": 1024, "steps": 4, "cfgScale": 1.5, "sampler": "k_dpmpp_2m",
            "samples": 3, "seed": 42}"#,
    )
    .into_params(&LimitsConfig::default())
    .unwrap();

    assert_eq!(params.prompt, " harbor at dusk ");
    assert_eq!(params.negative_prompt, "people");
    assert_eq!((params.width, params.height), (768, 1024));
    assert_eq!(params.steps, 4);
    assert_eq!(params.cfg_scale, 1.5);
    assert_eq!(params.sampler, Sampler::KDpmpp2m);
    assert_eq!(params.samples, 3);
    assert_eq!(params.seed, 42);
}

#[test]
fn test_cfg_scale_alias() {
    let request = parse(r#"{"prompt": "x", "cfg_scale": 12.0}"#);
    assert_eq!(request.cfg_scale, Some(12.0));
}

#[test]
fn test_missing_prompt_fails_to_parse() {
    assert!(serde_json::from_str::<GenerationRequest>(r#"{"width": 512}"#).is_err());
}

#[test]
fn test_random_seeds_vary() {
    let limits = LimitsConfig::default();
    let seeds: std::collections::HashSet<u64> = (0..16)
        .map(|_| GenerationRequest::new("x").into_params(&limits).unwrap().seed)
        .collect();
    assert!(seeds.len() > 1);
}

#[test]
fn test_limits_are_enforced() {
    let limits = LimitsConfig {
        max_dimension: 1024,
        max_steps: 50,
        max_samples: 2,
        max_cfg_scale: 20.0,
    };

    let cases = [
        r#"{"prompt": "x", "width": 2048}"#,
        r#"{"prompt": "x", "height": 0}"#,
        r#"{"prompt": "x", "steps": 51}"#,
        r#"{"prompt": "x", "samples": 3}"#,
        r#"{"prompt": "x", "cfgScale": 20.5}"#,
        r#"{"prompt": "x", "cfgScale": -1.0}"#,
    ];

    for json in cases {
        let err = parse(json).into_params(&limits).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)), "case: {}", json);
    }
}

#[test]
fn test_sizes_are_not_rounded_or_aligned() {
    let params = parse(r#"{"prompt": "x", "width": 100, "height": 1}"#)
        .into_params(&LimitsConfig::default())
        .unwrap();
    assert_eq!((params.width, params.height), (100, 1));
}

#[test]
fn test_error_message_names_the_field() {
    let err = parse(r#"{"prompt": "x", "steps": 0}"#)
        .into_params(&LimitsConfig::default())
        .unwrap_err();
    assert!(err.to_string().starts_with("steps:"));

    let err = parse(r#"{"prompt": "x", "sampler": "EULER_FAST"}"#)
        .into_params(&LimitsConfig::default())
        .unwrap_err();
    assert!(err.to_string().starts_with("sampler:"));
}

#[test]
fn test_single_sample_response_omits_images() {
    let response = GenerationResponse {
        image: "data:image/png;base64,AAAA".to_string(),
        seed: 3,
        images: None,
    };

    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(
        json,
        serde_json::json!({"image": "data:image/png;base64,AAAA", "seed": 3})
    );
}
