//! Fee Estimator
//!
//! Estimates the network fee of a payout transaction before it is built,
//! so the fee can be taken out of the recipients' amounts up front.
//! The size model is the RingCT estimate used by the reference wallet:
//! four inputs are assumed, plus one change output.

use crate::gateway::DaemonRpc;

/// Fee per byte used when the daemon cannot be asked
pub const DEFAULT_FEE_PER_BYTE: u64 = 2_000_000_000;

/// Quantization mask used when the daemon cannot be asked
pub const DEFAULT_QUANTIZATION_MASK: u64 = 10_000;

/// Inputs assumed for every payout transaction
pub const ASSUMED_INPUTS: u64 = 4;

/// Estimated serialized size in bytes of a RingCT transaction
pub fn estimate_rct_tx_size(n_inputs: u64, mixin: u64, n_outputs: u64, extra_size: u64, bulletproof: bool) -> u64 {
    let mut size = 0;

    // tx prefix: version + unlock time
    size += 1 + 6;
    // vin
    size += n_inputs * (1 + 6 + (mixin + 1) * 2 + 32);
    // vout
    size += n_outputs * (6 + 32);
    size += extra_size;

    // rct type
    size += 1;

    // range proofs
    if bulletproof {
        size += ((2 * 6 + 4 + 5) * 32 + 3) * n_outputs;
    } else {
        size += (2 * 64 * 32 + 32 + 64 * 32) * n_outputs;
    }

    // MGs
    size += n_inputs * (64 * (mixin + 1) + 32);
    // pseudoOuts
    size += 32 * n_inputs;
    // ecdhInfo
    size += 2 * 32 * n_outputs;
    // outPk, commitments only
    size += 32 * n_outputs;
    // txnFee
    size += 4;

    size
}

/// Fee for a transaction of `bytes` at the given rate, rounded up to the mask
pub fn quantized_fee(fee_per_byte: u64, bytes: u64, quantization_mask: u64) -> u64 {
    let mask = quantization_mask.max(1) as u128;
    let raw = fee_per_byte as u128 * bytes as u128;
    let fee = raw.div_ceil(mask) * mask;
    u64::try_from(fee).unwrap_or(u64::MAX)
}

/// Estimated fee for paying `recipients` outputs with the given ring size
///
/// Falls back to the default rate if the daemon fee estimate fails.
pub async fn estimate_fee(daemon: &dyn DaemonRpc, recipients: usize, ring_size: u64) -> u64 {
    let bytes = estimate_rct_tx_size(
        ASSUMED_INPUTS,
        ring_size.saturating_sub(1),
        recipients as u64 + 1,
        0,
        true,
    );

    let (fee_per_byte, mask) = match daemon.fee_estimate().await {
        Ok(estimate) => (estimate.fee, estimate.quantization_mask),
        Err(e) => {
            tracing::error!(target: "payoutd::payment", error = %e, "get_fee_estimate failed, using default fee rate");
            (DEFAULT_FEE_PER_BYTE, DEFAULT_QUANTIZATION_MASK)
        }
    };

    quantized_fee(fee_per_byte, bytes, mask)
}

/// Even per-recipient share of a fee, rounding down
pub fn split_fee(fee: u64, recipients: usize) -> u64 {
    if recipients == 0 {
        return fee;
    }
    fee / recipients as u64
}
