use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use edgepolicy_formula::AttributeValue;
use rand::Rng;

use super::{param_str, FunctionFactory, ParameterMap, PipelineContext, PolicyFunction};
use crate::error::Result;

/// Fixed base probability for `rate = "random"` (§4.5): one in thirty.
const RANDOM_SAMPLE_DENOMINATOR: u32 = 30;

#[derive(Debug, Clone, Copy)]
enum Rate {
    /// Emit every Nth value (N > 0).
    EveryN(u64),
    /// Emit every input (`rate = 0` or `"all"`).
    All,
    /// Emit no input (`"none"`).
    None,
    /// Emit with probability `1/RANDOM_SAMPLE_DENOMINATOR` (`"random"`, or
    /// the legacy `rate = -1` spelling).
    Random,
}

fn parse_rate(parameters: &ParameterMap) -> Rate {
    if let Some(s) = param_str(parameters, "rate") {
        return match s {
            "all" => Rate::All,
            "none" => Rate::None,
            "random" => Rate::Random,
            other => other.parse::<u64>().map(Rate::EveryN).unwrap_or(Rate::All),
        };
    }
    match parameters.get("rate").and_then(|v| v.as_i64()) {
        Some(0) => Rate::All,
        Some(-1) => Rate::Random,
        Some(n) if n > 0 => Rate::EveryN(n as u64),
        _ => Rate::All,
    }
}

/// Sampling policy: emits every Nth value, every value, no values, or a
/// random 1-in-30 subset (invariant 5).
pub struct SampleQuality {
    rate: Rate,
    counter: AtomicU64,
    last_value: Mutex<Option<AttributeValue>>,
}

impl PolicyFunction for SampleQuality {
    fn apply(&self, _ctx: &dyn PipelineContext, value: AttributeValue) -> bool {
        let emit = match self.rate {
            Rate::All => true,
            Rate::None => false,
            Rate::EveryN(n) => {
                let count = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
                count % n == 0
            }
            Rate::Random => rand::thread_rng().gen_ratio(1, RANDOM_SAMPLE_DENOMINATOR),
        };
        if emit {
            *self.last_value.lock().unwrap() = Some(value);
        }
        emit
    }

    fn get(&self, _ctx: &dyn PipelineContext) -> Option<AttributeValue> {
        self.last_value.lock().unwrap().take()
    }
}

pub struct SampleQualityFactory;
impl FunctionFactory for SampleQualityFactory {
    fn build(&self, parameters: &ParameterMap) -> Result<Box<dyn PolicyFunction>> {
        Ok(Box::new(SampleQuality {
            rate: parse_rate(parameters),
            counter: AtomicU64::new(0),
            last_value: Mutex::new(None),
        }))
    }
}
