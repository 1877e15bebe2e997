extern crate lucent;

use lucent::prelude::*;

#[test]
fn partial_overrides() {
    let json = r#"{
        "staging_threshold": 1024,
        "texture_expiration": 30,
        "upload_pool": { "trim_interval": 10 }
    }"#;

    let params = DriverParams::from_json(json).unwrap();
    assert_eq!(params.staging_threshold, 1024);
    assert_eq!(params.texture_expiration, 30);
    assert_eq!(params.upload_pool.trim_interval, 10);

    let defaults = DriverParams::default();
    assert_eq!(params.texture_upload_budget, defaults.texture_upload_budget);
    assert_eq!(params.max_texture_units, defaults.max_texture_units);
    assert_eq!(params.upload_pool.min_bucket, defaults.upload_pool.min_bucket);
}

#[test]
fn round_trip() {
    let mut params = DriverParams::default();
    params.buffer_expiration = 12;
    params.upload_pool = UploadPoolParams::with_upload_limit(8 << 20, 2 << 20);

    let json = params.to_json().unwrap();
    assert_eq!(DriverParams::from_json(&json).unwrap(), params);
}

#[test]
fn invalid() {
    assert!(DriverParams::from_json("{ staging_threshold: }").is_err());
    assert!(DriverParams::from_json(r#"{ "staging_threshold": -1 }"#).is_err());
}
