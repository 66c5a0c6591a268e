use std::collections::HashMap;
use std::sync::Mutex;

use edgepolicy_formula::{AttributeValue, Formula};

use super::{
    param_bool, param_str, AlertSeverity, FunctionFactory, ParameterMap, PipelineContext,
    PolicyFunction,
};
use crate::error::{PolicyError, Result};

fn parse_formula(parameters: &ParameterMap, key: &str) -> Result<Formula> {
    let source = param_str(parameters, key)
        .ok_or_else(|| PolicyError::PipelineConfiguration(format!("missing '{key}' parameter")))?;
    Formula::parse(source).map_err(PolicyError::from)
}

/// `apply` returns true iff `condition` evaluates to 0 (the value passes
/// the filter); `get` returns the input value unchanged.
pub struct FilterCondition {
    condition: Formula,
    last_value: Mutex<Option<AttributeValue>>,
}

impl PolicyFunction for FilterCondition {
    fn apply(&self, ctx: &dyn PipelineContext, value: AttributeValue) -> bool {
        let passes = self.condition.eval(ctx) == 0.0;
        if passes {
            *self.last_value.lock().unwrap() = Some(value);
        }
        passes
    }

    fn get(&self, _ctx: &dyn PipelineContext) -> Option<AttributeValue> {
        self.last_value.lock().unwrap().take()
    }
}

pub struct FilterConditionFactory;
impl FunctionFactory for FilterConditionFactory {
    fn build(&self, parameters: &ParameterMap) -> Result<Box<dyn PolicyFunction>> {
        Ok(Box::new(FilterCondition {
            condition: parse_formula(parameters, "condition")?,
            last_value: Mutex::new(None),
        }))
    }
}

/// On a true condition, queues an action invocation; stops the pipeline
/// unless `filter` is explicitly `false` (default `true`).
pub struct ActionCondition {
    condition: Formula,
    action_name: String,
    filter: bool,
    last_value: Mutex<Option<AttributeValue>>,
}

impl PolicyFunction for ActionCondition {
    fn apply(&self, ctx: &dyn PipelineContext, value: AttributeValue) -> bool {
        *self.last_value.lock().unwrap() = Some(value);
        if self.condition.eval(ctx) != 0.0 {
            ctx.queue_action(&self.action_name, HashMap::new());
            !self.filter
        } else {
            true
        }
    }

    fn get(&self, _ctx: &dyn PipelineContext) -> Option<AttributeValue> {
        self.last_value.lock().unwrap().take()
    }
}

pub struct ActionConditionFactory;
impl FunctionFactory for ActionConditionFactory {
    fn build(&self, parameters: &ParameterMap) -> Result<Box<dyn PolicyFunction>> {
        let action_name = param_str(parameters, "action")
            .ok_or_else(|| PolicyError::PipelineConfiguration("missing 'action' parameter".to_string()))?
            .to_string();
        Ok(Box::new(ActionCondition {
            condition: parse_formula(parameters, "condition")?,
            action_name,
            filter: param_bool(parameters, "filter", true),
            last_value: Mutex::new(None),
        }))
    }
}

/// On a true condition, queues an alert built from `urn`/`fields`/`severity`
/// (default `NORMAL`... spec default is SIGNIFICANT for the message format
/// itself; `alertCondition`'s own default is explicitly `NORMAL` per §4.5).
pub struct AlertCondition {
    condition: Formula,
    urn: String,
    fields: Vec<String>,
    severity: AlertSeverity,
    filter: bool,
    last_value: Mutex<Option<AttributeValue>>,
}

impl PolicyFunction for AlertCondition {
    fn apply(&self, ctx: &dyn PipelineContext, value: AttributeValue) -> bool {
        *self.last_value.lock().unwrap() = Some(value);
        if self.condition.eval(ctx) != 0.0 {
            let mut payload = HashMap::new();
            for field in &self.fields {
                if let Some(v) = ctx.current_attribute(field) {
                    payload.insert(field.clone(), v);
                }
            }
            ctx.queue_alert(&self.urn, self.severity, payload);
            !self.filter
        } else {
            true
        }
    }

    fn get(&self, _ctx: &dyn PipelineContext) -> Option<AttributeValue> {
        self.last_value.lock().unwrap().take()
    }
}

pub struct AlertConditionFactory;
impl FunctionFactory for AlertConditionFactory {
    fn build(&self, parameters: &ParameterMap) -> Result<Box<dyn PolicyFunction>> {
        let urn = param_str(parameters, "urn")
            .ok_or_else(|| PolicyError::PipelineConfiguration("missing 'urn' parameter".to_string()))?
            .to_string();
        let fields = parameters
            .get("fields")
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        Ok(Box::new(AlertCondition {
            condition: parse_formula(parameters, "condition")?,
            urn,
            fields,
            severity: AlertSeverity::Normal,
            filter: param_bool(parameters, "filter", true),
            last_value: Mutex::new(None),
        }))
    }
}

/// Computes `formula` once per invocation; skipped (no propagation) if the
/// result is not finite. `get` consumes and clears the computed value.
pub struct ComputedMetric {
    formula: Formula,
    computed: Mutex<Option<f64>>,
}

impl PolicyFunction for ComputedMetric {
    fn apply(&self, ctx: &dyn PipelineContext, _value: AttributeValue) -> bool {
        let result = self.formula.eval(ctx);
        if result.is_finite() {
            *self.computed.lock().unwrap() = Some(result);
            true
        } else {
            false
        }
    }

    fn get(&self, _ctx: &dyn PipelineContext) -> Option<AttributeValue> {
        self.computed
            .lock()
            .unwrap()
            .take()
            .map(AttributeValue::Number)
    }
}

pub struct ComputedMetricFactory;
impl FunctionFactory for ComputedMetricFactory {
    fn build(&self, parameters: &ParameterMap) -> Result<Box<dyn PolicyFunction>> {
        Ok(Box::new(ComputedMetric {
            formula: parse_formula(parameters, "formula")?,
            computed: Mutex::new(None),
        }))
    }
}
