use std::sync::Mutex;

use edgepolicy_formula::AttributeValue;

use super::{
    param_bool, param_f64, FunctionFactory, NetworkCostTier, ParameterMap, PipelineContext,
    PolicyFunction,
};
use crate::error::{PolicyError, Result};

struct BatchState {
    values: Vec<AttributeValue>,
    window_start: i64,
}

fn flush(state: &mut BatchState) -> Option<AttributeValue> {
    if state.values.is_empty() {
        return None;
    }
    let joined = state
        .values
        .iter()
        .map(|v| v.as_display_string())
        .collect::<Vec<_>>()
        .join(",");
    state.values.clear();
    Some(AttributeValue::String(joined))
}

/// Accumulates values until `size` is reached, then flushes. `persistent`
/// mode additionally writes each intermediate value through the message
/// persistence collaborator as it arrives.
pub struct BatchBySize {
    size: u64,
    persistent: bool,
    count: Mutex<u64>,
    state: Mutex<BatchState>,
}

impl PolicyFunction for BatchBySize {
    fn apply(&self, ctx: &dyn PipelineContext, value: AttributeValue) -> bool {
        if self.persistent {
            ctx.persist_batched_value("", &value);
        }
        self.state.lock().unwrap().values.push(value);
        let mut count = self.count.lock().unwrap();
        *count += 1;
        if *count >= self.size {
            *count = 0;
            true
        } else {
            false
        }
    }

    fn get(&self, _ctx: &dyn PipelineContext) -> Option<AttributeValue> {
        flush(&mut self.state.lock().unwrap())
    }
}

pub struct BatchBySizeFactory;
impl FunctionFactory for BatchBySizeFactory {
    fn build(&self, parameters: &ParameterMap) -> Result<Box<dyn PolicyFunction>> {
        let size = param_f64(parameters, "size")
            .ok_or_else(|| PolicyError::PipelineConfiguration("missing 'size' parameter".to_string()))?
            as u64;
        Ok(Box::new(BatchBySize {
            size,
            persistent: param_bool(parameters, "persistent", false),
            count: Mutex::new(0),
            state: Mutex::new(BatchState {
                values: Vec::new(),
                window_start: 0,
            }),
        }))
    }
}

/// Accumulates values until the configured time window elapses.
pub struct BatchByTime {
    window_ms: i64,
    persistent: bool,
    state: Mutex<BatchState>,
}

impl PolicyFunction for BatchByTime {
    fn apply(&self, ctx: &dyn PipelineContext, value: AttributeValue) -> bool {
        if self.persistent {
            ctx.persist_batched_value("", &value);
        }
        let now = ctx.now_ms();
        let mut state = self.state.lock().unwrap();
        state.values.push(value);
        if now - state.window_start >= self.window_ms {
            state.window_start = now;
            true
        } else {
            false
        }
    }

    fn get(&self, _ctx: &dyn PipelineContext) -> Option<AttributeValue> {
        flush(&mut self.state.lock().unwrap())
    }
}

pub struct BatchByTimeFactory;
impl FunctionFactory for BatchByTimeFactory {
    fn build(&self, parameters: &ParameterMap) -> Result<Box<dyn PolicyFunction>> {
        let window_ms = param_f64(parameters, "window")
            .ok_or_else(|| PolicyError::PipelineConfiguration("missing 'window' parameter".to_string()))?
            as i64;
        Ok(Box::new(BatchByTime {
            window_ms,
            persistent: param_bool(parameters, "persistent", false),
            state: Mutex::new(BatchState {
                values: Vec::new(),
                window_start: 0,
            }),
        }))
    }
}

/// Accumulates values until the measured network cost tier drops to or
/// below the configured tier (ascending `SATELLITE < CELLULAR < BLUETOOTH
/// < WIFI < ETHERNET`).
pub struct BatchByCost {
    max_tier: NetworkCostTier,
    persistent: bool,
    state: Mutex<BatchState>,
}

impl PolicyFunction for BatchByCost {
    fn apply(&self, ctx: &dyn PipelineContext, value: AttributeValue) -> bool {
        if self.persistent {
            ctx.persist_batched_value("", &value);
        }
        self.state.lock().unwrap().values.push(value);
        ctx.network_cost_tier() <= self.max_tier
    }

    fn get(&self, _ctx: &dyn PipelineContext) -> Option<AttributeValue> {
        flush(&mut self.state.lock().unwrap())
    }
}

fn parse_tier(name: &str) -> Option<NetworkCostTier> {
    match name {
        "SATELLITE" => Some(NetworkCostTier::Satellite),
        "CELLULAR" => Some(NetworkCostTier::Cellular),
        "BLUETOOTH" => Some(NetworkCostTier::Bluetooth),
        "WIFI" => Some(NetworkCostTier::Wifi),
        "ETHERNET" => Some(NetworkCostTier::Ethernet),
        _ => None,
    }
}

pub struct BatchByCostFactory;
impl FunctionFactory for BatchByCostFactory {
    fn build(&self, parameters: &ParameterMap) -> Result<Box<dyn PolicyFunction>> {
        let tier_name = super::param_str(parameters, "tier")
            .ok_or_else(|| PolicyError::PipelineConfiguration("missing 'tier' parameter".to_string()))?;
        let max_tier = parse_tier(tier_name)
            .ok_or_else(|| PolicyError::PipelineConfiguration(format!("unknown network cost tier: {tier_name}")))?;
        Ok(Box::new(BatchByCost {
            max_tier,
            persistent: param_bool(parameters, "persistent", false),
            state: Mutex::new(BatchState {
                values: Vec::new(),
                window_start: 0,
            }),
        }))
    }
}
