//! End-to-end initiative flows through the public API.

use dicebot_core::{
    AdvantageMode, GroupRollSpec, InitiativeEntry, InitiativeTracker, SessionKey, SharedTracker,
    UserId,
};

const CHANNEL: SessionKey = SessionKey(0xC0FFEE);

#[test]
fn full_encounter_flow() {
    let mut tracker = InitiativeTracker::new();

    tracker
        .add(
            CHANNEL,
            InitiativeEntry::roll("Vex", 5, AdvantageMode::Advantage).with_owner(UserId(1)),
        )
        .unwrap();
    tracker
        .add(
            CHANNEL,
            InitiativeEntry::with_fixed_total("Grog", 1, 14).with_owner(UserId(2)),
        )
        .unwrap();
    let goblins = tracker
        .add_group(
            CHANNEL,
            &GroupRollSpec {
                prefix: "Goblin".into(),
                count: 3,
                modifier: 2,
                mode: AdvantageMode::Normal,
                shared: false,
            },
        )
        .unwrap();
    assert_eq!(goblins.len(), 3);
    assert_eq!(tracker.len(CHANNEL), 5);

    // Always sorted non-increasing by total.
    let totals: Vec<i32> = tracker.entries(CHANNEL).iter().map(|e| e.total()).collect();
    for pair in totals.windows(2) {
        assert!(pair[0] >= pair[1]);
    }

    // Grog re-rolls and replaces his own entry, never hitting capacity.
    tracker
        .add(CHANNEL, InitiativeEntry::with_fixed_total("grog", 1, 22))
        .unwrap();
    assert_eq!(tracker.len(CHANNEL), 5);

    let removed = tracker.remove(CHANNEL, "goblin 2").unwrap();
    assert!(removed.is_npc);
    assert_eq!(tracker.len(CHANNEL), 4);

    tracker.clear(CHANNEL);
    assert!(tracker.is_empty(CHANNEL));
}

#[test]
fn capacity_is_a_hard_ceiling() {
    let mut tracker = InitiativeTracker::new();
    let capacity = tracker.capacity();

    for i in 0..capacity {
        tracker
            .add(
                CHANNEL,
                InitiativeEntry::with_fixed_total(format!("fighter {i}"), 0, i as i32),
            )
            .unwrap();
    }
    assert!(tracker
        .add(CHANNEL, InitiativeEntry::with_fixed_total("straggler", 0, 30))
        .is_err());
    assert_eq!(tracker.len(CHANNEL), capacity);

    // Bulk adds are all-or-nothing.
    let before = tracker.len(CHANNEL);
    assert!(tracker
        .add_group(
            CHANNEL,
            &GroupRollSpec {
                prefix: "rat".into(),
                count: 1,
                modifier: 0,
                mode: AdvantageMode::Normal,
                shared: false,
            },
        )
        .is_err());
    assert_eq!(tracker.len(CHANNEL), before);
}

#[test]
fn tie_break_favors_newcomers() {
    let mut tracker = InitiativeTracker::new();
    for name in ["one", "two", "three"] {
        tracker
            .add(CHANNEL, InitiativeEntry::with_fixed_total(name, 0, 12))
            .unwrap();
    }
    let names: Vec<&str> = tracker
        .entries(CHANNEL)
        .iter()
        .map(|e| e.name.as_str())
        .collect();
    assert_eq!(names, vec!["three", "two", "one"]);
}

#[test]
fn suggestions_respect_threshold_and_order() {
    let mut tracker = InitiativeTracker::new();
    for name in ["Bandit Captain", "Bandit 1", "bandit 2", "Commoner"] {
        tracker
            .add(CHANNEL, InitiativeEntry::with_fixed_total(name, 0, 10))
            .unwrap();
    }
    let suggestions = tracker.suggestions(CHANNEL, "bandit");
    assert_eq!(
        suggestions,
        vec!["Bandit 1", "Bandit Captain", "bandit 2"]
    );
    assert!(tracker.suggestions(CHANNEL, "zzzzzz").is_empty());
}

#[tokio::test]
async fn shared_tracker_serializes_commands() {
    let shared = SharedTracker::default();

    let mut handles = Vec::new();
    for i in 0..40 {
        let shared = shared.clone();
        handles.push(tokio::spawn(async move {
            shared
                .add(
                    CHANNEL,
                    InitiativeEntry::with_fixed_total(format!("npc {i}"), 0, i),
                )
                .await
        }));
    }
    for handle in handles {
        let _ = handle.await.unwrap();
    }

    let entries = shared.entries(CHANNEL).await;
    assert_eq!(entries.len(), 25);
    for pair in entries.windows(2) {
        assert!(pair[0].total() >= pair[1].total());
    }
}
