use crate::config::ExitSettings;

const BPS_DENOMINATOR: u128 = 10_000;

/// 优先费升级梯度（单位：micro-lamports / compute unit）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeEscalation {
    pub ceiling: u64,
    pub granularity: u64,
    pub factor_bps: u64,
    pub levels: usize,
}

impl Default for FeeEscalation {
    fn default() -> Self {
        Self {
            ceiling: 3_000_000,
            granularity: 1_000,
            factor_bps: 13_500,
            levels: 3,
        }
    }
}

impl FeeEscalation {
    pub fn from_settings(settings: &ExitSettings) -> Self {
        Self {
            ceiling: settings.fee_ceiling,
            granularity: settings.fee_granularity,
            factor_bps: settings.escalation_factor_bps,
            levels: settings.variant_count.max(1),
        }
    }

    /// 生成升级序列：首档向下取整到粒度并封顶，之后每档乘以系数后封顶。
    /// 偶数下标先取整再封顶，且不低于上一档；重复的相邻档位合并。
    pub fn levels(&self, base: u64) -> Vec<u64> {
        let mut levels: Vec<u64> = Vec::with_capacity(self.levels.max(1));
        let mut current = self.floor(base).min(self.ceiling);
        levels.push(current);

        for index in 1..self.levels.max(1) {
            let scaled = u128::from(current) * u128::from(self.factor_bps) / BPS_DENOMINATOR;
            let scaled = u64::try_from(scaled).unwrap_or(u64::MAX);
            let next = if index % 2 == 0 {
                self.floor(scaled).min(self.ceiling).max(current)
            } else {
                scaled.min(self.ceiling)
            };
            current = next;
            if levels.last() != Some(&next) {
                levels.push(next);
            }
        }
        levels
    }

    fn floor(&self, value: u64) -> u64 {
        if self.granularity == 0 {
            value
        } else {
            value - value % self.granularity
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ladder_matches_reference_values() {
        let escalation = FeeEscalation::default();
        assert_eq!(escalation.levels(250_000), vec![250_000, 337_500, 455_000]);
    }

    #[test]
    fn levels_are_idempotent_and_capped() {
        let escalation = FeeEscalation {
            ceiling: 500_000,
            levels: 6,
            ..FeeEscalation::default()
        };
        for base in [0, 1, 999, 250_000, 400_000, 3_000_000, u64::MAX] {
            let first = escalation.levels(base);
            assert_eq!(first, escalation.levels(base));
            assert!(first.iter().all(|level| *level <= escalation.ceiling));
            assert!(first.windows(2).all(|pair| pair[0] < pair[1]));
        }
    }

    #[test]
    fn capped_ladder_collapses_duplicates() {
        let escalation = FeeEscalation {
            ceiling: 300_000,
            ..FeeEscalation::default()
        };
        assert_eq!(escalation.levels(250_000), vec![250_000, 300_000]);
        assert_eq!(escalation.levels(5_000_000), vec![300_000]);
    }

    #[test]
    fn zero_granularity_keeps_raw_values() {
        let escalation = FeeEscalation {
            granularity: 0,
            ..FeeEscalation::default()
        };
        assert_eq!(escalation.levels(1_001), vec![1_001, 1_351, 1_823]);
    }

    #[test]
    fn flooring_never_lowers_a_level() {
        assert_eq!(FeeEscalation::default().levels(1_000), vec![1_000, 1_350]);
    }

    #[test]
    fn ceiling_off_granularity_is_reached() {
        let escalation = FeeEscalation {
            ceiling: 3_000_500,
            ..FeeEscalation::default()
        };
        assert_eq!(
            escalation.levels(2_000_000),
            vec![2_000_000, 2_700_000, 3_000_500]
        );
    }

    #[test]
    fn zero_base_stays_at_zero() {
        assert_eq!(FeeEscalation::default().levels(0), vec![0]);
    }
}
