// src/plan/codec.rs

//! JSON round-trip for plans, as used by whatever persists them.
//!
//! Dates are written as ISO-8601 strings. On the way back in, the struct
//! layout is enforced strictly but individual dates are lenient (see
//! [`crate::plan::dates`]).

use crate::errors::Result;
use crate::plan::model::TaskPlan;

pub fn encode_plan(plan: &TaskPlan) -> Result<String> {
    Ok(serde_json::to_string_pretty(plan)?)
}

pub fn decode_plan(json: &str) -> Result<TaskPlan> {
    Ok(serde_json::from_str(json)?)
}
