use super::*;

fn test_config() -> TrialConfig {
    TrialConfig {
        initial_secs: 300,
        credits_per_minute: 4,
        guest_credits: 20,
    }
}

fn registry() -> TrialRegistry {
    TrialRegistry {
        inner: Arc::new(Mutex::new(HashMap::new())),
        config: test_config(),
    }
}

// ======
// TrialTimer
// ======

#[test]
fn fresh_timer_has_full_budget() {
    let timer = TrialTimer::new(&test_config(), Instant::now());
    assert_eq!(timer.remaining_secs(), 300);
    assert!(!timer.is_expired());
}

#[test]
fn tick_decrements_one_per_elapsed_second() {
    let t0 = Instant::now();
    let mut timer = TrialTimer::new(&test_config(), t0);

    let commands = timer.tick(t0 + Duration::from_secs(1));
    assert!(commands.is_empty());
    assert_eq!(timer.remaining_secs(), 299);

    let commands = timer.tick(t0 + Duration::from_secs(3));
    assert!(commands.is_empty());
    assert_eq!(timer.remaining_secs(), 297);
}

#[test]
fn sub_second_elapsed_carries_over() {
    let t0 = Instant::now();
    let mut timer = TrialTimer::new(&test_config(), t0);

    assert!(timer.tick(t0 + Duration::from_millis(400)).is_empty());
    assert_eq!(timer.remaining_secs(), 300);

    // 1.4s total elapsed: exactly one whole second consumed.
    assert!(timer.tick(t0 + Duration::from_millis(1400)).is_empty());
    assert_eq!(timer.remaining_secs(), 299);
}

#[test]
fn minute_boundary_charges_once() {
    let t0 = Instant::now();
    let mut timer = TrialTimer::new(&test_config(), t0);

    let commands = timer.tick(t0 + Duration::from_secs(59));
    assert!(commands.is_empty());

    let commands = timer.tick(t0 + Duration::from_secs(60));
    assert_eq!(commands, vec![TrialCommand::DeductCredits { amount: 4 }]);

    // No double charge inside the same minute.
    let commands = timer.tick(t0 + Duration::from_secs(61));
    assert!(commands.is_empty());
}

#[test]
fn stalled_caller_emits_missed_charges() {
    let t0 = Instant::now();
    let mut timer = TrialTimer::new(&test_config(), t0);

    let commands = timer.tick(t0 + Duration::from_secs(130));
    assert_eq!(
        commands,
        vec![
            TrialCommand::DeductCredits { amount: 4 },
            TrialCommand::DeductCredits { amount: 4 },
        ]
    );
    assert_eq!(timer.remaining_secs(), 170);
}

#[test]
fn expiry_is_terminal_and_emitted_once() {
    let t0 = Instant::now();
    let mut timer = TrialTimer::new(&test_config(), t0);

    let commands = timer.tick(t0 + Duration::from_secs(300));
    assert_eq!(commands.len(), 6, "five charges plus expire: {commands:?}");
    assert_eq!(commands[5], TrialCommand::Expire);
    assert!(timer.is_expired());
    assert_eq!(timer.remaining_secs(), 0);

    assert!(timer.tick(t0 + Duration::from_secs(301)).is_empty());
}

#[test]
fn remaining_never_goes_below_zero() {
    let t0 = Instant::now();
    let mut timer = TrialTimer::new(&test_config(), t0);

    timer.tick(t0 + Duration::from_secs(10_000));
    assert_eq!(timer.remaining_secs(), 0);
}

#[test]
fn full_trial_charges_exactly_the_guest_budget() {
    let t0 = Instant::now();
    let config = test_config();
    let mut timer = TrialTimer::new(&config, t0);

    let mut charged = 0;
    for s in 1..=300 {
        for command in timer.tick(t0 + Duration::from_secs(s)) {
            if let TrialCommand::DeductCredits { amount } = command {
                charged += amount;
            }
        }
    }
    assert_eq!(charged, config.guest_credits);
    assert!(timer.is_expired());
}

// ======
// TrialRegistry
// ======

#[test]
fn register_and_snapshot() {
    let reg = registry();
    let guest = Uuid::new_v4();
    let t0 = Instant::now();

    assert!(reg.snapshot(guest).is_none());
    reg.register_at(guest, t0);

    let snap = reg.snapshot(guest).unwrap();
    assert_eq!(snap.remaining_secs, 300);
    assert!(!snap.expired);
}

#[test]
fn tick_all_reports_only_moved_clocks() {
    let reg = registry();
    let guest = Uuid::new_v4();
    let t0 = Instant::now();
    reg.register_at(guest, t0);

    assert!(reg.tick_all_at(t0 + Duration::from_millis(500)).is_empty());

    let updates = reg.tick_all_at(t0 + Duration::from_secs(1));
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].guest_id, guest);
    assert_eq!(updates[0].remaining_secs, 299);
}

#[test]
fn check_action_false_after_expiry_until_reset() {
    let reg = registry();
    let guest = Uuid::new_v4();
    let t0 = Instant::now();
    reg.register_at(guest, t0);

    let updates = reg.tick_all_at(t0 + Duration::from_secs(300));
    assert!(updates[0].commands.contains(&TrialCommand::Expire));

    assert!(!reg.check_action_at(guest, t0 + Duration::from_secs(301)));
    assert!(!reg.check_action_at(guest, t0 + Duration::from_secs(302)));

    reg.reset(guest);
    assert!(reg.check_action(guest));
}

#[test]
fn check_action_registers_unknown_guests() {
    let reg = registry();
    let guest = Uuid::new_v4();

    assert!(reg.check_action_at(guest, Instant::now()));
    assert!(reg.snapshot(guest).is_some());
}

#[test]
fn remove_drops_the_clock() {
    let reg = registry();
    let guest = Uuid::new_v4();
    reg.register(guest);
    reg.remove(guest);
    assert!(reg.snapshot(guest).is_none());
    assert!(reg.tick_all_at(Instant::now() + Duration::from_secs(5)).is_empty());
}

#[test]
fn expired_clock_stops_producing_updates() {
    let reg = registry();
    let guest = Uuid::new_v4();
    let t0 = Instant::now();
    reg.register_at(guest, t0);

    reg.tick_all_at(t0 + Duration::from_secs(300));
    assert!(reg.tick_all_at(t0 + Duration::from_secs(600)).is_empty());

    let snap = reg.snapshot(guest).unwrap();
    assert!(snap.expired);
    assert_eq!(snap.remaining_secs, 0);
}
