//! Exponential moving average over a raw value slice.
//!
//! k = 2/(n+1), EMA[0] = V[0], then EMA[i] = V[i]*k + EMA[i-1]*(1-k).
//! Seeded with the first value, so every index carries a value.

pub fn ema_values(values: &[f64], period: usize) -> Vec<f64> {
    if values.is_empty() || period == 0 {
        return Vec::new();
    }

    let k = 2.0 / (period as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    let mut ema = values[0];
    out.push(ema);
    for &v in &values[1..] {
        ema = v * k + ema * (1.0 - k);
        out.push(ema);
    }
    out
}
