//! Timing formulas of the protocol. Both scale with `ceil(log10(n + 1))`
//! for a cluster of `n` members (self included).
use std::time::Duration;

/// Exact `ceil(log10(value))` for `value >= 1`; zero for zero.
pub fn ceil_log10(value: u64) -> u32 {
    let mut digits = 0;
    let mut power: u64 = 1;
    while power < value {
        power = power.saturating_mul(10);
        digits += 1;
    }
    digits
}

/// How long a member stays SUSPECT before it is confirmed dead.
pub fn suspicion_timeout(multiplier: u32, cluster_size: usize, probe_interval: Duration) -> Duration {
    let rounds = multiplier.saturating_mul(ceil_log10(cluster_size as u64 + 1));
    probe_interval.saturating_mul(rounds)
}

/// How many outgoing messages a fact is piggybacked on before it is dropped
/// from the dissemination buffer.
pub fn gossip_periods_to_spread(multiplier: u32, cluster_size: usize) -> u32 {
    multiplier.saturating_mul(ceil_log10(cluster_size as u64 + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ceil_log10() {
        assert_eq!(ceil_log10(0), 0);
        assert_eq!(ceil_log10(1), 0);
        assert_eq!(ceil_log10(2), 1);
        assert_eq!(ceil_log10(10), 1);
        assert_eq!(ceil_log10(11), 2);
        assert_eq!(ceil_log10(100), 2);
        assert_eq!(ceil_log10(101), 3);
    }

    #[test]
    fn test_suspicion_timeout_three_member_cluster() {
        let timeout = suspicion_timeout(3, 3, Duration::from_millis(1000));
        assert_eq!(timeout, Duration::from_millis(3000));
    }

    #[test]
    fn test_suspicion_timeout_grows_with_cluster() {
        let probe = Duration::from_millis(1000);
        assert_eq!(suspicion_timeout(5, 9, probe), Duration::from_secs(5));
        assert_eq!(suspicion_timeout(5, 10, probe), Duration::from_secs(10));
        assert_eq!(suspicion_timeout(5, 100, probe), Duration::from_secs(15));
    }

    #[test]
    fn test_gossip_periods_to_spread() {
        assert_eq!(gossip_periods_to_spread(3, 1), 3);
        assert_eq!(gossip_periods_to_spread(3, 50), 6);
    }
}
