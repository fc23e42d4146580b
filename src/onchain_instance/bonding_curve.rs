//! Bonding curve account decoding and spot price derivation.

use serde::Serialize;
use solana_sdk::native_token::LAMPORTS_PER_SOL;
use thiserror::Error;

/// Decimal places of every pump.fun token.
pub const TOKEN_DECIMALS: u32 = 6;

/// Anchor account tag of `BondingCurve`.
pub const BONDING_CURVE_DISCRIMINATOR: [u8; 8] = 6966180631402821399u64.to_le_bytes();

/// discriminator + 5 x u64 + complete flag
pub const BONDING_CURVE_LEN: usize = 8 + 5 * 8 + 1;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unexpected discriminator")]
    UnexpectedDiscriminator,

    #[error("account data truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("price unavailable: reserves do not give a positive price")]
    PriceUnavailable,
}

/// Point-in-time reserve state of a bonding curve. Never cache it, price must
/// be fresh at the moment of trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BondingCurveState {
    pub virtual_token_reserves: u64,
    pub virtual_sol_reserves: u64,
    pub real_token_reserves: u64,
    pub real_sol_reserves: u64,
    pub token_total_supply: u64,
    pub complete: bool,
}

impl BondingCurveState {
    /// Decode a raw account blob, checking the discriminator first.
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = LeReader::new(data);

        let tag = reader.take::<8>()?;
        if tag != BONDING_CURVE_DISCRIMINATOR {
            return Err(DecodeError::UnexpectedDiscriminator);
        }

        Ok(Self {
            virtual_token_reserves: reader.u64()?,
            virtual_sol_reserves: reader.u64()?,
            real_token_reserves: reader.u64()?,
            real_sol_reserves: reader.u64()?,
            token_total_supply: reader.u64()?,
            complete: reader.take::<1>()?[0] != 0,
        })
    }

    /// Spot price in SOL per whole token, rounded to 9 decimals.
    pub fn price(&self) -> Result<f64, DecodeError> {
        spot_price(self.virtual_sol_reserves, self.virtual_token_reserves)
    }
}

pub fn spot_price(virtual_sol_reserves: u64, virtual_token_reserves: u64) -> Result<f64, DecodeError> {
    if virtual_token_reserves == 0 {
        return Err(DecodeError::PriceUnavailable);
    }

    let sol = virtual_sol_reserves as f64 / LAMPORTS_PER_SOL as f64;
    let price = sol / virtual_token_reserves as f64 * 10f64.powi(TOKEN_DECIMALS as i32);

    let price = round9(price);
    if !(price.is_finite() && price > 0.0) {
        return Err(DecodeError::PriceUnavailable);
    }
    Ok(price)
}

/// Round half away from zero to 9 decimal places.
pub fn round9(value: f64) -> f64 {
    (value * 1e9).round() / 1e9
}

struct LeReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> LeReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let end = self.offset + N;
        let bytes = self
            .data
            .get(self.offset..end)
            .ok_or(DecodeError::Truncated {
                expected: BONDING_CURVE_LEN,
                actual: self.data.len(),
            })?;
        self.offset = end;

        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    fn u64(&mut self) -> Result<u64, DecodeError> {
        self.take::<8>().map(u64::from_le_bytes)
    }
}

#[cfg(test)]
pub(crate) fn encode_fixture(state: &BondingCurveState) -> Vec<u8> {
    let mut data = Vec::with_capacity(BONDING_CURVE_LEN);
    data.extend_from_slice(&BONDING_CURVE_DISCRIMINATOR);
    data.extend_from_slice(&state.virtual_token_reserves.to_le_bytes());
    data.extend_from_slice(&state.virtual_sol_reserves.to_le_bytes());
    data.extend_from_slice(&state.real_token_reserves.to_le_bytes());
    data.extend_from_slice(&state.real_sol_reserves.to_le_bytes());
    data.extend_from_slice(&state.token_total_supply.to_le_bytes());
    data.push(state.complete as u8);
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> BondingCurveState {
        BondingCurveState {
            virtual_token_reserves: 1_073_000_000_000_000,
            virtual_sol_reserves: 30_000_000_000,
            real_token_reserves: 793_100_000_000_000,
            real_sol_reserves: 0,
            token_total_supply: 1_000_000_000_000_000,
            complete: false,
        }
    }

    #[test]
    fn discriminator_matches_anchor_tag() {
        assert_eq!(BONDING_CURVE_DISCRIMINATOR, [23, 183, 248, 55, 96, 216, 172, 96]);
    }

    #[test]
    fn decodes_known_blob() {
        let blob = encode_fixture(&fixture());
        assert_eq!(blob.len(), BONDING_CURVE_LEN);
        assert_eq!(BondingCurveState::decode(&blob).unwrap(), fixture());
    }

    #[test]
    fn decodes_complete_flag_and_ignores_trailing_bytes() {
        let mut state = fixture();
        state.complete = true;
        let mut blob = encode_fixture(&state);
        blob.extend_from_slice(&[0xAA; 32]);
        let decoded = BondingCurveState::decode(&blob).unwrap();
        assert!(decoded.complete);
        assert_eq!(decoded.token_total_supply, state.token_total_supply);
    }

    #[test]
    fn every_short_blob_is_truncated() {
        let blob = encode_fixture(&fixture());
        for len in 0..BONDING_CURVE_LEN {
            let err = BondingCurveState::decode(&blob[..len]).unwrap_err();
            assert_eq!(
                err,
                DecodeError::Truncated { expected: BONDING_CURVE_LEN, actual: len },
                "length {len}"
            );
        }
    }

    #[test]
    fn wrong_prefix_is_rejected() {
        let mut blob = encode_fixture(&fixture());
        blob[0] ^= 0xFF;
        assert_eq!(
            BondingCurveState::decode(&blob).unwrap_err(),
            DecodeError::UnexpectedDiscriminator
        );
    }

    #[test]
    fn reference_price() {
        let price = spot_price(30_000_000_000_000, 1_000_000_000_000).unwrap();
        assert_eq!(price, 0.03);
    }

    #[test]
    fn price_rounding_to_zero_is_unavailable() {
        // 0.4 SOL against the launch token reserves rounds to 0
        assert_eq!(
            spot_price(400_000_000, 1_073_000_000_000_000),
            Err(DecodeError::PriceUnavailable)
        );
        assert_eq!(spot_price(0, 1_000_000), Err(DecodeError::PriceUnavailable));
        assert_eq!(spot_price(1_000, 0), Err(DecodeError::PriceUnavailable));
    }

    #[test]
    fn launch_price_is_rounded_to_nine_places() {
        // 30 SOL / 1_073_000_000 tokens
        let price = fixture().price().unwrap();
        assert_eq!(price, 0.000000028);
    }

    #[test]
    fn zero_token_reserves_is_reported() {
        let mut state = fixture();
        state.virtual_token_reserves = 0;
        assert_eq!(state.price().unwrap_err(), DecodeError::PriceUnavailable);
    }

    #[test]
    fn round9_rounds_half_away_from_zero() {
        assert_eq!(round9(0.0000000015), 0.000000002);
        assert_eq!(round9(-0.0000000015), -0.000000002);
        assert_eq!(round9(1.0), 1.0);
    }
}
