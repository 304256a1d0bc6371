//! Shared fixtures

use cosreg_core::Topology;
use std::collections::BTreeMap;

/// Topology of a typical deployment
pub fn test_topology() -> Topology {
    Topology {
        model: "testmodel".into(),
        model_uuid: "f2c1b2a5-9d2c-4f31-8d6b-0a1f7c6e4b21".into(),
        application: "cos-registration-server".into(),
        unit: "cos-registration-server/0".into(),
        charm_name: "cos-registration-server-k8s".into(),
    }
}

/// Device uid -> public key map from literal pairs
pub fn keys(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(uid, key)| (uid.to_string(), key.to_string()))
        .collect()
}
