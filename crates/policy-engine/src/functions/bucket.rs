use std::sync::Mutex;

use edgepolicy_formula::AttributeValue;

use super::{param_f64, FunctionFactory, ParameterMap, PipelineContext, PolicyFunction};
use crate::error::{PolicyError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reduction {
    Mean,
    Min,
    Max,
    StandardDeviation,
}

impl Reduction {
    fn reduce(self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        match self {
            Reduction::Mean => Some(values.iter().sum::<f64>() / values.len() as f64),
            Reduction::Min => Some(values.iter().copied().fold(f64::INFINITY, f64::min)),
            Reduction::Max => Some(values.iter().copied().fold(f64::NEG_INFINITY, f64::max)),
            Reduction::StandardDeviation => {
                let mean = values.iter().sum::<f64>() / values.len() as f64;
                let variance =
                    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
                Some(variance.sqrt())
            }
        }
    }
}

fn gcd(a: u64, b: u64) -> u64 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

struct BucketState {
    buckets: Vec<Vec<f64>>,
    bucket_zero: usize,
    window_start: Option<i64>,
}

/// Bucket-model windowed reducer shared by `mean`/`min`/`max`/
/// `standardDeviation` (§4.5 bucket algorithm). `apply` always returns
/// `false`: these functions never propagate mid-window, only the scheduled
/// dispatcher's `get` call produces a value.
pub struct BucketReducer {
    reduction: Reduction,
    window_ms: i64,
    slide_ms: i64,
    span_ms: i64,
    num_buckets: usize,
    state: Mutex<BucketState>,
}

impl BucketReducer {
    fn new(reduction: Reduction, window_ms: i64, slide_ms: i64) -> Self {
        let span_ms = gcd(window_ms as u64, slide_ms as u64).max(1) as i64;
        let num_buckets = (window_ms.max(slide_ms) / span_ms) as usize + 1;
        Self {
            reduction,
            window_ms,
            slide_ms,
            span_ms,
            num_buckets,
            state: Mutex::new(BucketState {
                buckets: vec![Vec::new(); num_buckets],
                bucket_zero: 0,
                window_start: None,
            }),
        }
    }
}

impl PolicyFunction for BucketReducer {
    fn apply(&self, ctx: &dyn PipelineContext, value: AttributeValue) -> bool {
        let now = ctx.now_ms();
        let v = value.as_f64();
        let mut state = self.state.lock().unwrap();
        // Anchors the window to the first sample's clock reading instead of
        // a fixed epoch, so a reducer fed real wall-clock timestamps still
        // buckets its first few samples together.
        let window_start = *state.window_start.get_or_insert(now);
        let idx = ((now - window_start) / self.span_ms).max(0) as usize;
        let slot = (state.bucket_zero + idx) % self.num_buckets;
        state.buckets[slot].push(v);
        false
    }

    fn get(&self, _ctx: &dyn PipelineContext) -> Option<AttributeValue> {
        let mut state = self.state.lock().unwrap();
        let window_buckets = (self.window_ms / self.span_ms) as usize;
        let slide_buckets = (self.slide_ms / self.span_ms) as usize;
        let num_buckets = self.num_buckets;

        let mut values = Vec::new();
        for offset in 0..window_buckets {
            let slot = (state.bucket_zero + offset) % num_buckets;
            values.extend_from_slice(&state.buckets[slot]);
        }
        let reduced = self.reduction.reduce(&values);

        for offset in 0..slide_buckets {
            let slot = (state.bucket_zero + offset) % num_buckets;
            state.buckets[slot].clear();
        }
        state.bucket_zero = (state.bucket_zero + slide_buckets) % num_buckets;
        state.window_start = Some(state.window_start.unwrap_or(0) + self.slide_ms);

        reduced.map(AttributeValue::Number)
    }
}

pub struct BucketFactory(pub Reduction);
impl FunctionFactory for BucketFactory {
    fn build(&self, parameters: &ParameterMap) -> Result<Box<dyn PolicyFunction>> {
        let window = param_f64(parameters, "window")
            .ok_or_else(|| PolicyError::PipelineConfiguration("missing 'window' parameter".to_string()))?
            as i64;
        let slide = param_f64(parameters, "slide")
            .ok_or_else(|| PolicyError::PipelineConfiguration("missing 'slide' parameter".to_string()))?
            as i64;
        Ok(Box::new(BucketReducer::new(self.0, window, slide)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::{AlertSeverity, NetworkCostTier};
    use std::collections::HashMap;

    struct ClockContext(std::cell::Cell<i64>);
    impl edgepolicy_formula::AttributeContext for ClockContext {
        fn current_attribute(&self, _name: &str) -> Option<AttributeValue> {
            None
        }
        fn in_process_attribute(&self, _name: &str) -> Option<AttributeValue> {
            None
        }
    }
    impl PipelineContext for ClockContext {
        fn now_ms(&self) -> i64 {
            self.0.get()
        }
        fn queue_action(&self, _name: &str, _arguments: HashMap<String, serde_json::Value>) {}
        fn queue_alert(&self, _format_urn: &str, _severity: AlertSeverity, _fields: HashMap<String, AttributeValue>) {}
        fn network_cost_tier(&self) -> NetworkCostTier {
            NetworkCostTier::Wifi
        }
        fn persist_batched_value(&self, _attribute: &str, _value: &AttributeValue) {}
    }

    #[test]
    fn windowed_mean_matches_s1_scenario() {
        let mut params = ParameterMap::new();
        params.insert("window".to_string(), serde_json::json!(1000));
        params.insert("slide".to_string(), serde_json::json!(500));
        let function = BucketFactory(Reduction::Mean).build(&params).unwrap();

        let ctx_at = |t: i64| ClockContext(std::cell::Cell::new(t));

        function.apply(&ctx_at(0), AttributeValue::Number(10.0));
        function.apply(&ctx_at(400), AttributeValue::Number(30.0));
        function.apply(&ctx_at(900), AttributeValue::Number(20.0));

        // first fire at t=1000: window [0,1000) -> {10,30,20} mean 20.0
        assert_eq!(function.get(&ctx_at(1000)), Some(AttributeValue::Number(20.0)));

        // second fire at t=1500: window [500,1500) -> only the t=900 value -> 20.0
        assert_eq!(function.get(&ctx_at(1500)), Some(AttributeValue::Number(20.0)));

        // no further offers: empty window -> null -> skipped
        assert_eq!(function.get(&ctx_at(2000)), None);
    }

    #[test]
    fn min_max_and_stddev_reduce_correctly() {
        let mut params = ParameterMap::new();
        params.insert("window".to_string(), serde_json::json!(1000));
        params.insert("slide".to_string(), serde_json::json!(1000));

        let min_fn = BucketFactory(Reduction::Min).build(&params).unwrap();
        let max_fn = BucketFactory(Reduction::Max).build(&params).unwrap();
        let ctx0 = ClockContext(std::cell::Cell::new(0));
        min_fn.apply(&ctx0, AttributeValue::Number(5.0));
        min_fn.apply(&ctx0, AttributeValue::Number(2.0));
        max_fn.apply(&ctx0, AttributeValue::Number(5.0));
        max_fn.apply(&ctx0, AttributeValue::Number(2.0));
        assert_eq!(min_fn.get(&ctx0), Some(AttributeValue::Number(2.0)));
        assert_eq!(max_fn.get(&ctx0), Some(AttributeValue::Number(5.0)));
    }
}
