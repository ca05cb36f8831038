//! One output seam for both shapes: human lines as the command progresses,
//! or a single JSON object with a top-level `success` flag at the end.

use std::fmt::Display;

use lazykit::KitError;
use serde_json::{json, Map, Value};

pub struct Output {
    json: bool,
}

impl Output {
    pub fn new(json: bool) -> Self {
        Output { json }
    }

    pub fn is_json(&self) -> bool {
        self.json
    }

    /// Print a line in human mode; silent under --json.
    pub fn human(&self, line: impl Display) {
        if !self.json {
            println!("{line}");
        }
    }

    /// Terminate a successful command: print the success envelope under --json.
    pub fn finish(&self, payload: Value) {
        if self.json {
            println!("{}", envelope(payload));
        }
    }
}

/// Merge a command payload's fields into `{"success": true, ...}`.
pub fn envelope(payload: Value) -> Value {
    let mut object = Map::new();
    object.insert("success".into(), Value::Bool(true));
    if let Value::Object(fields) = payload {
        object.extend(fields);
    }
    Value::Object(object)
}

/// Failure rendering shared by every command; exit code 1 follows.
pub fn failure(json: bool, err: &KitError) {
    if json {
        println!("{}", json!({ "success": false, "error": err.to_string() }));
    } else {
        eprintln!("error: {err}");
    }
}
