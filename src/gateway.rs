// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Static descriptors of the DLS gateway shown by `drivesoft status`.

use serde::Serialize;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Endpoint {
    pub path: &'static str,
    pub method: &'static str,
    pub description: &'static str,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ApiManifest {
    pub name: &'static str,
    pub version: &'static str,
    pub endpoints: Vec<Endpoint>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SystemStatus {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime: &'static str,
    pub nodes: Vec<&'static str>,
}

pub fn api_manifest() -> ApiManifest {
    ApiManifest {
        name: "DriveSoft DLS API Gateway",
        version: "1.0",
        endpoints: vec![
            Endpoint { path: "/vault/upload", method: "POST", description: "Upload binaries to the vault" },
            Endpoint { path: "/vault/fetch", method: "GET", description: "Fetch files from the vault" },
            Endpoint { path: "/auth/verify", method: "POST", description: "Verify a DLS 1.0 key" },
        ],
    }
}

pub fn system_status() -> SystemStatus {
    SystemStatus {
        status: "OPERATIONAL",
        version: "DLS 1.0.12-VAULT",
        uptime: "99.99%",
        nodes: vec!["Warszawa-Main-01", "Krakow-Edge-02", "DLS-Cloud-Global"],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_lists_vault_endpoints() {
        let manifest = api_manifest();
        assert_eq!(manifest.endpoints.len(), 3);
        assert!(manifest.endpoints.iter().any(|e| e.path == "/vault/fetch" && e.method == "GET"));
    }

    #[test]
    fn test_status_serializes() {
        let json = serde_json::to_value(system_status()).unwrap();
        assert_eq!(json["status"], "OPERATIONAL");
        assert_eq!(json["nodes"].as_array().unwrap().len(), 3);
    }
}
