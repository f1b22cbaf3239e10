use crate::position::PositionRecord;

/// Fill `portfolio_value`, `holdings` and `cash` on simulated records.
///
/// Portfolio value compounds strategy returns from `initial_capital`. Share
/// count is fixed at `initial_capital / first price` for the whole run, so
/// `holdings` reflects that notional while long and `cash` is the remainder.
pub fn apply_valuation(records: &mut [PositionRecord], initial_capital: f64) {
    let Some(first) = records.first() else {
        return;
    };
    let share_size = initial_capital / first.price;

    let mut growth = 1.0;
    for record in records.iter_mut() {
        growth *= 1.0 + record.strategy_return;
        record.portfolio_value = initial_capital * growth;
        record.holdings = f64::from(record.position) * record.price * share_size;
        record.cash = record.portfolio_value - record.holdings;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use bbr_core::{PositionStatus, Signal};

    fn record(price: f64, position: u8, strategy_return: f64) -> PositionRecord {
        PositionRecord {
            timestamp: 0,
            price,
            signal: Signal::None,
            position,
            status: PositionStatus::OutOfMarket,
            period_return: strategy_return,
            strategy_return,
            portfolio_value: 0.0,
            holdings: 0.0,
            cash: 0.0,
        }
    }

    #[test]
    fn test_compounding_and_split() {
        let mut records = vec![
            record(50.0, 1, 0.0),
            record(55.0, 1, 0.1),
            record(60.5, 0, 0.1),
        ];
        apply_valuation(&mut records, 1000.0);

        assert_eq!(records[0].portfolio_value, 1000.0);
        assert_relative_eq!(records[1].portfolio_value, 1100.0, epsilon = 1e-9);
        assert_relative_eq!(records[2].portfolio_value, 1210.0, epsilon = 1e-9);

        // 20 shares fixed at the first price.
        assert_relative_eq!(records[1].holdings, 1100.0, epsilon = 1e-9);
        assert_relative_eq!(records[1].cash, 0.0, epsilon = 1e-9);
        assert_eq!(records[2].holdings, 0.0);
        assert_relative_eq!(records[2].cash, 1210.0, epsilon = 1e-9);
    }

    #[test]
    fn test_empty_is_noop() {
        let mut records: Vec<PositionRecord> = Vec::new();
        apply_valuation(&mut records, 1000.0);
        assert!(records.is_empty());
    }
}
