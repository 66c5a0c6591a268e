use std::collections::HashMap;
use std::sync::Mutex;

use edgepolicy_formula::AttributeValue;

use super::{param_f64, AlertSeverity, FunctionFactory, ParameterMap, PipelineContext, PolicyFunction};
use crate::error::{PolicyError, Result};

fn window_ms(parameters: &ParameterMap) -> Result<i64> {
    param_f64(parameters, "window")
        .map(|v| v as i64)
        .ok_or_else(|| PolicyError::PipelineConfiguration("missing 'window' parameter".to_string()))
}

struct DedupState {
    last_value: Option<AttributeValue>,
    last_emit_at: i64,
}

/// Squelches successive equal values within a rolling window: emits `v` at
/// time `t` iff `v != previous` OR `t - last_emit_at >= window` (invariant 4).
pub struct EliminateDuplicates {
    window: i64,
    state: Mutex<DedupState>,
}

impl PolicyFunction for EliminateDuplicates {
    fn apply(&self, ctx: &dyn PipelineContext, value: AttributeValue) -> bool {
        let now = ctx.now_ms();
        let mut state = self.state.lock().unwrap();
        let should_emit = match &state.last_value {
            Some(previous) if *previous == value => now - state.last_emit_at >= self.window,
            _ => true,
        };
        if should_emit {
            state.last_value = Some(value);
            state.last_emit_at = now;
        }
        should_emit
    }

    fn get(&self, _ctx: &dyn PipelineContext) -> Option<AttributeValue> {
        self.state.lock().unwrap().last_value.clone()
    }
}

pub struct EliminateDuplicatesFactory;
impl FunctionFactory for EliminateDuplicatesFactory {
    fn build(&self, parameters: &ParameterMap) -> Result<Box<dyn PolicyFunction>> {
        Ok(Box::new(EliminateDuplicates {
            window: window_ms(parameters)?,
            state: Mutex::new(DedupState {
                last_value: None,
                last_emit_at: i64::MIN / 2,
            }),
        }))
    }
}

/// Same windowing rule as `eliminateDuplicates`, but never filters; instead
/// raises an alert (using `alertCondition`'s configuration shape) on the
/// first duplicate observed within each window.
pub struct DetectDuplicates {
    window: i64,
    urn: String,
    state: Mutex<DedupState>,
    alerted_this_window: Mutex<bool>,
}

impl PolicyFunction for DetectDuplicates {
    fn apply(&self, ctx: &dyn PipelineContext, value: AttributeValue) -> bool {
        let now = ctx.now_ms();
        let mut state = self.state.lock().unwrap();
        let is_duplicate = matches!(&state.last_value, Some(previous) if *previous == value)
            && now - state.last_emit_at < self.window;

        if is_duplicate {
            let mut alerted = self.alerted_this_window.lock().unwrap();
            if !*alerted {
                *alerted = true;
                ctx.queue_alert(&self.urn, AlertSeverity::Normal, HashMap::new());
            }
        } else {
            state.last_value = Some(value);
            state.last_emit_at = now;
            *self.alerted_this_window.lock().unwrap() = false;
        }
        true
    }

    fn get(&self, _ctx: &dyn PipelineContext) -> Option<AttributeValue> {
        self.state.lock().unwrap().last_value.clone()
    }
}

pub struct DetectDuplicatesFactory;
impl FunctionFactory for DetectDuplicatesFactory {
    fn build(&self, parameters: &ParameterMap) -> Result<Box<dyn PolicyFunction>> {
        let urn = super::param_str(parameters, "urn")
            .ok_or_else(|| PolicyError::PipelineConfiguration("missing 'urn' parameter".to_string()))?
            .to_string();
        Ok(Box::new(DetectDuplicates {
            window: window_ms(parameters)?,
            urn,
            state: Mutex::new(DedupState {
                last_value: None,
                last_emit_at: i64::MIN / 2,
            }),
            alerted_this_window: Mutex::new(false),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::NetworkCostTier;

    struct FixedClockContext(i64);
    impl edgepolicy_formula::AttributeContext for FixedClockContext {
        fn current_attribute(&self, _name: &str) -> Option<AttributeValue> {
            None
        }
        fn in_process_attribute(&self, _name: &str) -> Option<AttributeValue> {
            None
        }
    }
    impl PipelineContext for FixedClockContext {
        fn now_ms(&self) -> i64 {
            self.0
        }
        fn queue_action(&self, _name: &str, _arguments: HashMap<String, serde_json::Value>) {}
        fn queue_alert(&self, _format_urn: &str, _severity: AlertSeverity, _fields: HashMap<String, AttributeValue>) {}
        fn network_cost_tier(&self) -> NetworkCostTier {
            NetworkCostTier::Wifi
        }
        fn persist_batched_value(&self, _attribute: &str, _value: &AttributeValue) {}
    }

    #[test]
    fn eliminate_duplicates_matches_s4_scenario() {
        let mut params = ParameterMap::new();
        params.insert("window".to_string(), serde_json::json!(5000));
        let function = EliminateDuplicatesFactory.build(&params).unwrap();

        assert!(function.apply(&FixedClockContext(0), AttributeValue::Number(1.0))); // emitted
        assert!(!function.apply(&FixedClockContext(1000), AttributeValue::Number(1.0))); // dropped
        assert!(function.apply(&FixedClockContext(1000), AttributeValue::Number(2.0))); // emitted (value changed)
        assert!(!function.apply(&FixedClockContext(5500), AttributeValue::Number(2.0))); // dropped (< window)
        assert!(function.apply(&FixedClockContext(6500), AttributeValue::Number(2.0))); // emitted (window elapsed)
    }
}
