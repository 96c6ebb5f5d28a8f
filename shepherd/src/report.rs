// src/report.rs

//! The state-times artifact.
//!
//! A single JSON document `{program → {state → seconds_since_origin}}`,
//! written once after every program has reached `final`. Entries appear in
//! transition order; timestamps are floating-point seconds.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::{Map, Value};

use crate::state::StateTimes;

pub fn write_state_times(path: &Path, programs: &[(String, StateTimes)]) -> Result<()> {
    let mut root = Map::new();
    for (name, times) in programs {
        let mut entry = Map::new();
        for (state, seconds) in times.iter() {
            entry.insert(state.name().to_string(), Value::from(seconds));
        }
        root.insert(name.clone(), Value::Object(entry));
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating output directory {:?}", parent))?;
        }
    }

    let json = serde_json::to_string_pretty(&Value::Object(root))
        .context("serializing state times")?;
    fs::write(path, json).with_context(|| format!("writing state times to {:?}", path))
}
