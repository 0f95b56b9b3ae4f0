use super::*;

#[test]
fn test_happy_path() {
    let s = transition(ComposeState::Candidate, ComposeEvent::Promote).unwrap();
    assert_eq!(s, ComposeState::Registered);
    let s = transition(s, ComposeEvent::SendClicked).unwrap();
    assert_eq!(s, ComposeState::SendTriggered);
    let s = transition(s, ComposeEvent::RootDetached).unwrap();
    assert_eq!(s, ComposeState::TornDown);
}

#[test]
fn test_teardown_from_any_live_state() {
    for state in [
        ComposeState::Candidate,
        ComposeState::Registered,
        ComposeState::SendTriggered,
    ] {
        assert_eq!(
            transition(state, ComposeEvent::RootDetached),
            Ok(ComposeState::TornDown)
        );
    }
}

#[test]
fn test_second_send_click_rejected() {
    let err = transition(ComposeState::SendTriggered, ComposeEvent::SendClicked).unwrap_err();
    assert_eq!(err.state, ComposeState::SendTriggered);
    assert_eq!(err.event, ComposeEvent::SendClicked);
}

#[test]
fn test_click_before_registration_rejected() {
    assert!(transition(ComposeState::Candidate, ComposeEvent::SendClicked).is_err());
}

#[test]
fn test_torn_down_is_terminal() {
    for event in [
        ComposeEvent::Promote,
        ComposeEvent::SendClicked,
        ComposeEvent::RootDetached,
    ] {
        assert!(transition(ComposeState::TornDown, event).is_err());
    }
}

#[test]
fn test_double_promote_rejected() {
    assert!(transition(ComposeState::Registered, ComposeEvent::Promote).is_err());
}

#[test]
fn test_holds_primary() {
    assert!(!ComposeState::Candidate.holds_primary());
    assert!(ComposeState::Registered.holds_primary());
    assert!(ComposeState::SendTriggered.holds_primary());
    assert!(!ComposeState::TornDown.holds_primary());
}

#[test]
fn test_admit_order() {
    let open = RegistrationGate {
        visible: true,
        primary_held: false,
        send_in_progress: false,
    };
    assert_eq!(admit(open), Ok(()));
    assert_eq!(
        admit(RegistrationGate {
            visible: false,
            primary_held: true,
            send_in_progress: true
        }),
        Err(IgnoreReason::Hidden)
    );
    assert_eq!(
        admit(RegistrationGate {
            primary_held: true,
            send_in_progress: true,
            ..open
        }),
        Err(IgnoreReason::SendInProgress)
    );
    assert_eq!(
        admit(RegistrationGate {
            primary_held: true,
            ..open
        }),
        Err(IgnoreReason::SecondarySurface)
    );
}
