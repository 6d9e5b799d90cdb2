use super::*;

#[test]
fn test_classify_picks_highest_severity() {
    let mixed = vk::DebugUtilsMessageSeverityFlagsEXT::WARNING | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR;
    assert_eq!(classify_severity(mixed), MessageSeverity::Error);
    assert_eq!(
        classify_severity(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING),
        MessageSeverity::Warning
    );
    assert_eq!(classify_severity(vk::DebugUtilsMessageSeverityFlagsEXT::INFO), MessageSeverity::Info);
    assert_eq!(
        classify_severity(vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE),
        MessageSeverity::Verbose
    );
}

#[test]
fn test_message_type_names() {
    assert_eq!(message_type_name(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION), "Validation");
    assert_eq!(message_type_name(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE), "Performance");
    assert_eq!(message_type_name(vk::DebugUtilsMessageTypeFlagsEXT::GENERAL), "General");
}

#[test]
fn test_tracker_counts_per_severity() {
    let tracker = ValidationStatsTracker::new();
    tracker.record(MessageSeverity::Error);
    tracker.record(MessageSeverity::Warning);
    tracker.record(MessageSeverity::Warning);
    tracker.record(MessageSeverity::Verbose);

    let stats = tracker.stats();
    assert_eq!(stats.errors, 1);
    assert_eq!(stats.warnings, 2);
    assert_eq!(stats.info, 0);
    assert_eq!(stats.verbose, 1);
    assert_eq!(stats.total(), 4);
}

#[test]
fn test_tracker_reset_zeroes_counts() {
    let tracker = ValidationStatsTracker::new();
    tracker.record(MessageSeverity::Info);
    tracker.reset();
    assert_eq!(tracker.stats(), ValidationStats::default());
}
