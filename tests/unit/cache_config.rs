use rstest::rstest;
use vcpu32_core::common::ConfigError;
use vcpu32_core::config::{CacheConfig, Configuration, TlbConfig};

#[rstest]
#[case(0, true)]
#[case(1, false)]
#[case(16, false)]
#[case(17, false)]
fn tlb_entry_count_is_rejected_only_when_zero(#[case] entries: usize, #[case] should_fail: bool) {
    let mut cfg = Configuration::default();
    cfg.itlb = TlbConfig { entries, latency: 2 };
    assert_eq!(cfg.validate().is_err(), should_fail);
    if should_fail {
        assert!(matches!(cfg.validate(), Err(ConfigError::ZeroTlbEntries("itlb"))));
    }
}

#[rstest]
#[case(1, true)]
#[case(2, true)]
#[case(3, false)]
#[case(32, true)]
#[case(48, false)]
fn l1_block_size_must_be_a_power_of_two(#[case] block_size: u32, #[case] valid: bool) {
    let mut cfg = Configuration::default();
    cfg.l1_dcache = CacheConfig { block_size, ..cfg.l1_dcache };
    assert_eq!(cfg.validate().is_ok(), valid);
}
