//! Property tests for the search signature's canonicalization invariants.

use proptest::prelude::*;

use voyagegate::search::compute_signature;
use voyagegate::upstream::types::RoomGuests;

fn arb_guests() -> impl Strategy<Value = Vec<RoomGuests>> {
    prop::collection::vec(
        (1u32..6, prop::collection::vec(0u32..17, 0..3)).prop_map(|(adults, children)| RoomGuests { adults, children }),
        1..4,
    )
}

proptest! {
    #[test]
    fn signature_is_a_pure_function_of_its_inputs(
        region_id in 1i64..10_000,
        day in 1u32..27,
        guests in arb_guests(),
        currency in "[A-Z]{3}",
    ) {
        let checkin = format!("2025-08-{day:02}");
        let checkout = format!("2025-08-{:02}", day + 1);
        let a = compute_signature(region_id, &checkin, &checkout, &guests, &currency);
        let b = compute_signature(region_id, &checkin, &checkout, &guests, &currency);
        prop_assert_eq!(a, b);
    }

    #[test]
    fn signature_is_independent_of_currency_case(
        region_id in 1i64..10_000,
        guests in arb_guests(),
    ) {
        let lower = compute_signature(region_id, "2025-08-01", "2025-08-02", &guests, "usd");
        let upper = compute_signature(region_id, "2025-08-01", "2025-08-02", &guests, "USD");
        prop_assert_eq!(lower, upper);
    }

    #[test]
    fn differing_region_always_changes_the_signature(
        region_a in 1i64..5_000,
        region_b in 5_001i64..10_000,
        guests in arb_guests(),
    ) {
        let sig_a = compute_signature(region_a, "2025-08-01", "2025-08-02", &guests, "USD");
        let sig_b = compute_signature(region_b, "2025-08-01", "2025-08-02", &guests, "USD");
        prop_assert_ne!(sig_a, sig_b);
    }
}
