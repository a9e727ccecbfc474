#![allow(dead_code)]

use std::path::Path;

use serde_json::{Map, Value, json};
use swarmstate::config::{ConfigFile, RawConfigFile};
use swarmstate::types::GcMethod;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn state_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.config.manager.state_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn devices(mut self, devices: usize) -> Self {
        self.config.manager.devices = devices;
        self
    }

    pub fn gc(mut self, method: GcMethod) -> Self {
        self.config.gc.method = method;
        self
    }

    pub fn storage(mut self, capacity_bytes: u64, threshold_bytes: u64) -> Self {
        self.config.gc.capacity_bytes = capacity_bytes;
        self.config.gc.threshold_bytes = threshold_bytes;
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `task-submit` request documents.
pub struct TaskRequestBuilder {
    doc: Map<String, Value>,
}

impl TaskRequestBuilder {
    pub fn new(command: &str) -> Self {
        let mut doc = Map::new();
        doc.insert("command".into(), json!(command));
        Self { doc }
    }

    pub fn input(self, file: &str) -> Self {
        self.push("inputs", file)
    }

    pub fn output(self, file: &str) -> Self {
        self.push("outputs", file)
    }

    pub fn devices(mut self, devices: i64) -> Self {
        let resources = self
            .doc
            .entry("resources")
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(map) = resources {
            map.insert("devices".into(), json!(devices));
        }
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        let env = self
            .doc
            .entry("environment")
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(map) = env {
            map.insert(key.into(), json!(value));
        }
        self
    }

    pub fn project(mut self, project: &str) -> Self {
        self.doc.insert("project".into(), json!(project));
        self
    }

    pub fn build(self) -> Value {
        Value::Object(self.doc)
    }

    fn push(mut self, key: &str, file: &str) -> Self {
        let list = self.doc.entry(key).or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(items) = list {
            items.push(json!(file));
        }
        self
    }
}

/// `file-declare` document with the given type.
pub fn file_request(file_type: &str) -> Value {
    json!({ "type": file_type })
}
