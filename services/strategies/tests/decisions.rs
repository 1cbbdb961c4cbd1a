//! Property checks over every built-in decision variant

use proptest::prelude::*;
use rust_decimal::Decimal;
use std::collections::BTreeSet;
use torq_strategies::StrategyFactory;
use torq_types::{MarketTick, StrategyConfig, StrategyId};

fn price_path() -> impl Strategy<Value = Vec<u32>> {
    // prices in paise, 1.00 .. 5000.00
    prop::collection::vec(100u32..500_000, 1..300)
}

proptest! {
    #[test]
    fn emitted_drafts_are_always_publishable(prices in price_path()) {
        let factory = StrategyFactory::with_builtin();
        let subscribed: BTreeSet<String> = ["INFY".to_string()].into_iter().collect();

        for strategy_type in factory.known_types() {
            let config = StrategyConfig::new("prop", strategy_type, ["INFY"]);
            let mut decision = factory.build(&config).unwrap();

            for (i, paise) in prices.iter().enumerate() {
                let tick = MarketTick::new("INFY", Decimal::new(*paise as i64, 2), i as u64 + 1);
                let Some(draft) = decision.on_tick(&tick).unwrap() else {
                    continue;
                };
                prop_assert!((0.0..=1.0).contains(&draft.confidence));
                prop_assert!(draft.quantity >= Decimal::ZERO);

                let signal = draft.into_signal(StrategyId::new("prop"));
                prop_assert!(signal.validate_for(&subscribed).is_ok());
            }
        }
    }
}
