/// Vulkan debug messenger - routes validation layer messages into the engine logger
///
/// The messenger itself is only compiled with the `vulkan-validation` feature.
/// Statistics are always available and simply stay at zero without it.

use ash::vk;
use colored::*;
use std::sync::atomic::{AtomicU32, Ordering};

#[cfg(feature = "vulkan-validation")]
use nova_rhi::{engine_error, engine_info, engine_trace, engine_warn};

#[cfg(feature = "vulkan-validation")]
const SOURCE: &str = "nova::vulkan::Validation";

/// Global validation statistics
static VALIDATION_STATS: ValidationStatsTracker = ValidationStatsTracker::new();

/// Number of validation messages received per severity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidationStats {
    pub errors: u32,
    pub warnings: u32,
    pub info: u32,
    pub verbose: u32,
}

impl ValidationStats {
    pub fn total(&self) -> u32 {
        self.errors + self.warnings + self.info + self.verbose
    }
}

/// Severity of one validation message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(not(feature = "vulkan-validation"), allow(dead_code))]
pub(crate) enum MessageSeverity {
    Error,
    Warning,
    Info,
    Verbose,
}

/// Thread-safe validation statistics tracker
pub(crate) struct ValidationStatsTracker {
    errors: AtomicU32,
    warnings: AtomicU32,
    info: AtomicU32,
    verbose: AtomicU32,
}

#[cfg_attr(not(feature = "vulkan-validation"), allow(dead_code))]
impl ValidationStatsTracker {
    pub(crate) const fn new() -> Self {
        Self {
            errors: AtomicU32::new(0),
            warnings: AtomicU32::new(0),
            info: AtomicU32::new(0),
            verbose: AtomicU32::new(0),
        }
    }

    pub(crate) fn record(&self, severity: MessageSeverity) {
        let counter = match severity {
            MessageSeverity::Error => &self.errors,
            MessageSeverity::Warning => &self.warnings,
            MessageSeverity::Info => &self.info,
            MessageSeverity::Verbose => &self.verbose,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn stats(&self) -> ValidationStats {
        ValidationStats {
            errors: self.errors.load(Ordering::Relaxed),
            warnings: self.warnings.load(Ordering::Relaxed),
            info: self.info.load(Ordering::Relaxed),
            verbose: self.verbose.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn reset(&self) {
        self.errors.store(0, Ordering::Relaxed);
        self.warnings.store(0, Ordering::Relaxed);
        self.info.store(0, Ordering::Relaxed);
        self.verbose.store(0, Ordering::Relaxed);
    }
}

/// Highest severity contained in a messenger severity mask
#[cfg_attr(not(feature = "vulkan-validation"), allow(dead_code))]
pub(crate) fn classify_severity(flags: vk::DebugUtilsMessageSeverityFlagsEXT) -> MessageSeverity {
    if flags.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        MessageSeverity::Error
    } else if flags.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        MessageSeverity::Warning
    } else if flags.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        MessageSeverity::Info
    } else {
        MessageSeverity::Verbose
    }
}

#[cfg_attr(not(feature = "vulkan-validation"), allow(dead_code))]
pub(crate) fn message_type_name(message_type: vk::DebugUtilsMessageTypeFlagsEXT) -> &'static str {
    if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION) {
        "Validation"
    } else if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE) {
        "Performance"
    } else {
        "General"
    }
}

/// Current validation statistics
pub fn validation_stats() -> ValidationStats {
    VALIDATION_STATS.stats()
}

/// Zero the validation statistics
pub fn reset_validation_stats() {
    VALIDATION_STATS.reset();
}

/// Print a coloured summary of the validation statistics to stdout
pub fn print_validation_stats_report() {
    let stats = validation_stats();

    if stats.total() == 0 {
        println!("\n{}", "No validation messages".green().bold());
        return;
    }

    println!("\n{}", "=== Validation Statistics ===".bright_blue().bold());
    if stats.errors > 0 {
        println!("  {} {}", "Errors:".red().bold(), stats.errors);
    }
    if stats.warnings > 0 {
        println!("  {} {}", "Warnings:".yellow().bold(), stats.warnings);
    }
    if stats.info > 0 {
        println!("  {} {}", "Info:".cyan(), stats.info);
    }
    if stats.verbose > 0 {
        println!("  {} {}", "Verbose:".bright_black(), stats.verbose);
    }
    println!("  {} {}", "Total:".white().bold(), stats.total());
    println!("{}\n", "=============================".bright_blue().bold());
}

/// Messenger parameters: warnings and errors of every message type
#[cfg(feature = "vulkan-validation")]
pub(crate) fn messenger_create_info() -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
    vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::ERROR | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(vulkan_debug_callback))
}

/// Vulkan debug messenger callback
///
/// Counts the message and forwards it to the engine logger at the matching
/// severity. Never asks the driver to abort the call.
#[cfg(feature = "vulkan-validation")]
unsafe extern "system" fn vulkan_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() {
        return vk::FALSE;
    }
    let callback_data = *p_callback_data;
    let message_id_name = if callback_data.p_message_id_name.is_null() {
        std::borrow::Cow::Borrowed("Unknown")
    } else {
        std::ffi::CStr::from_ptr(callback_data.p_message_id_name).to_string_lossy()
    };
    let message = if callback_data.p_message.is_null() {
        std::borrow::Cow::Borrowed("No message")
    } else {
        std::ffi::CStr::from_ptr(callback_data.p_message).to_string_lossy()
    };

    let severity = classify_severity(message_severity);
    VALIDATION_STATS.record(severity);

    let type_name = message_type_name(message_type);
    match severity {
        MessageSeverity::Error => engine_error!(SOURCE, "[{}] {}: {}", type_name, message_id_name, message),
        MessageSeverity::Warning => engine_warn!(SOURCE, "[{}] {}: {}", type_name, message_id_name, message),
        MessageSeverity::Info => engine_info!(SOURCE, "[{}] {}: {}", type_name, message_id_name, message),
        MessageSeverity::Verbose => engine_trace!(SOURCE, "[{}] {}: {}", type_name, message_id_name, message),
    }

    vk::FALSE
}

#[cfg(test)]
#[path = "vulkan_debug_tests.rs"]
mod tests;
