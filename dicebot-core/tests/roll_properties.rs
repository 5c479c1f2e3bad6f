//! Property-style checks on the public rolling API.

use dicebot_core::{roll, roll_with_mode_rng, AdvantageMode, DiceExpression, RollError};
use rand::rngs::StdRng;
use rand::SeedableRng;

const MODES: [AdvantageMode; 4] = [
    AdvantageMode::Normal,
    AdvantageMode::Advantage,
    AdvantageMode::Disadvantage,
    AdvantageMode::ElvenAccuracy,
];

#[test]
fn roll_count_matches_mode_for_any_expression() {
    let mut rng = StdRng::seed_from_u64(7);
    for notation in ["1d20+5", "2d6kh1", "4+4-3", "(1d4, 1d6)kh1"] {
        for mode in MODES {
            let result = roll_with_mode_rng(notation, mode, &mut rng).unwrap();
            assert_eq!(result.rolls.len(), mode.roll_count());
        }
    }
}

#[test]
fn winner_is_extreme_of_repetitions() {
    let mut rng = StdRng::seed_from_u64(99);
    for _ in 0..200 {
        let result = roll_with_mode_rng("1d20+5", AdvantageMode::Advantage, &mut rng).unwrap();
        assert_eq!(
            result.total(),
            result.rolls.iter().map(|r| r.total).max().unwrap()
        );

        let result = roll_with_mode_rng("1d20+5", AdvantageMode::Disadvantage, &mut rng).unwrap();
        assert_eq!(
            result.total(),
            result.rolls.iter().map(|r| r.total).min().unwrap()
        );

        let result = roll_with_mode_rng("1d20", AdvantageMode::ElvenAccuracy, &mut rng).unwrap();
        assert_eq!(
            result.total(),
            result.rolls.iter().map(|r| r.total).max().unwrap()
        );
    }
}

#[test]
fn fixed_arithmetic_totals() {
    assert_eq!(roll("4+4-3").unwrap().total(), 5);
    assert_eq!(roll("99*99-99").unwrap().total(), 9702);
    assert_eq!(roll("10/4").unwrap().total(), 2);
}

#[test]
fn classification_matrix() {
    let natural = roll("1d20mi20+5").unwrap();
    assert!(natural.winner().is_natural_twenty());
    assert!(!natural.winner().is_dirty_twenty());

    let fumble = roll("1d20ma1+5").unwrap();
    assert!(fumble.winner().is_natural_one());

    let dirty = roll("1d20mi17ma17+3").unwrap();
    assert!(dirty.winner().is_dirty_twenty());
    assert!(!dirty.winner().is_natural_twenty());
    assert_eq!(dirty.winner().total, 20);
}

#[test]
fn dice_and_comparison_flags() {
    assert!(!roll("120 + 5").unwrap().winner().contains_dice);
    assert!(roll("1d20+5").unwrap().winner().contains_dice);

    assert!(roll("1>0").unwrap().winner().has_comparison_result);
    assert!(roll("1==1").unwrap().winner().has_comparison_result);
    assert!(!roll("(6>7)*(1d8+7)").unwrap().winner().has_comparison_result);
}

#[test]
fn totals_stay_in_range_across_modes() {
    let mut rng = StdRng::seed_from_u64(3);
    for mode in MODES {
        for _ in 0..100 {
            let result = roll_with_mode_rng("1d20+5", mode, &mut rng).unwrap();
            assert!(result.total() >= 6 && result.total() <= 25);
            for single in &result.rolls {
                assert!(single.total >= 6 && single.total <= 25);
            }
        }
    }
}

#[test]
fn canonical_form_reparses_to_itself() {
    for notation in [
        "1d20 + 5",
        "4D6KH3",
        "2d6ro1mi2-1",
        "(1d8+2)*3",
        "(1, 2, 3)kh2",
        "1d20+5>=15",
    ] {
        let expr: DiceExpression = notation.parse().unwrap();
        let canonical = expr.to_string();
        let reparsed: DiceExpression = canonical.parse().unwrap();
        assert_eq!(reparsed.to_string(), canonical);
    }
}

#[test]
fn errors_are_reported_not_panicked() {
    for bad in ["", "1d", "d", "kh3", "1d20+", "(1d6", "1 = 1", "1d0"] {
        assert!(roll(bad).is_err(), "{bad:?} should fail to parse");
    }
    assert!(matches!(roll("1/0"), Err(RollError::DivideByZero)));
}

#[test]
fn oversized_terms_clamp_with_warning() {
    let result = roll("5000d5000").unwrap();
    assert_eq!(result.warnings.len(), 1);
    // 256 clamped dice of at most 2048 faces each.
    assert!(result.total() >= 256);
    assert!(result.total() <= 256 * 2048);
}
