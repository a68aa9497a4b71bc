use proptest::prelude::*;

use bounty_types::{Amount, BasisPoints, Percent, SCALE};

/// Decimal strings with up to 12 integer digits and up to 18 fractional digits.
fn decimal_string() -> impl Strategy<Value = String> {
    ("[0-9]{1,12}", proptest::option::of("[0-9]{1,18}")).prop_map(|(int, frac)| match frac {
        Some(frac) => format!("{int}.{frac}"),
        None => int,
    })
}

/// Reference canonicalisation done on the string itself.
fn canonical(s: &str) -> String {
    let (int, frac) = s.split_once('.').unwrap_or((s, ""));
    let int = int.trim_start_matches('0');
    let int = if int.is_empty() { "0" } else { int };
    let frac = frac.trim_end_matches('0');
    if frac.is_empty() {
        int.to_string()
    } else {
        format!("{int}.{frac}")
    }
}

proptest! {
    /// from_scaled(to_scaled(x)) renders the canonical form of x.
    #[test]
    fn parse_render_roundtrip(s in decimal_string()) {
        let amount = Amount::parse(&s).unwrap();
        prop_assert_eq!(amount.to_string(), canonical(&s));
        prop_assert_eq!(Amount::parse(&amount.to_string()).unwrap(), amount);
    }

    /// Subtracting what was added restores the original amount exactly.
    #[test]
    fn add_then_sub_is_identity(a in 0u128..u128::MAX / 2, b in 0u128..u128::MAX / 2) {
        let a = Amount::from_raw(a);
        let b = Amount::from_raw(b);
        let sum = a.checked_add(b).unwrap();
        prop_assert_eq!(sum.checked_sub(b).unwrap(), a);
    }

    /// Subtraction never clamps: a smaller minuend is always an error.
    #[test]
    fn sub_below_zero_always_fails(a in 0u128..1_000_000, extra in 1u128..1_000_000) {
        let a = Amount::from_raw(a);
        let b = Amount::from_raw(a.raw() + extra);
        prop_assert!(a.checked_sub(b).is_err());
    }

    /// Fee split conserves value: gross == fee + net.
    #[test]
    fn bps_split_conserves_value(raw in any::<u128>(), bps in 0u32..=10_000) {
        let gross = Amount::from_raw(raw);
        let bps = BasisPoints::new(bps).unwrap();
        let (fee, net) = gross.split_bps(bps);
        prop_assert_eq!(fee.checked_add(net).unwrap(), gross);
        prop_assert!(fee <= gross);
    }

    /// multiply_by_bps matches the naive formula wherever the naive formula fits.
    #[test]
    fn bps_matches_naive_floor(raw in 0u128..(u128::MAX / 10_000), bps in 0u32..=10_000) {
        let expected = raw * u128::from(bps) / 10_000;
        let got = Amount::from_raw(raw).multiply_by_bps(BasisPoints::new(bps).unwrap());
        prop_assert_eq!(got.raw(), expected);
    }

    /// Slash split by percent: slashed + returned == locked.
    #[test]
    fn percent_split_conserves_value(units in 0u64..1_000_000, pct in 0u32..=100) {
        let locked = Amount::from_units(units);
        let (slashed, returned) = locked.split_bps(Percent::new(pct).unwrap().to_bps());
        prop_assert_eq!(slashed.checked_add(returned).unwrap(), locked);
    }

    /// Bincode keeps the decimal-string representation lossless.
    #[test]
    fn amount_bincode_roundtrip(raw in any::<u128>()) {
        let amount = Amount::from_raw(raw);
        let encoded = bincode::serialize(&amount).unwrap();
        let decoded: Amount = bincode::deserialize(&encoded).unwrap();
        prop_assert_eq!(decoded, amount);
    }

    /// Whole units scale by exactly 10^18.
    #[test]
    fn from_units_scales(units in any::<u64>()) {
        prop_assert_eq!(Amount::from_units(units).raw(), u128::from(units) * SCALE);
    }
}
