// SPDX-License-Identifier: CEPL-1.0
//! Optional validation support.
//!
//! Bootstrap asks a [`Diagnostics`] collaborator for extra layers,
//! extensions and a messenger description. [`Silent`] contributes nothing;
//! [`Validation`] enables the Khronos layer and routes its messages into
//! `tracing` under the `tether::validation` target.
use std::{
    ffi::{c_void, CStr},
    fmt,
};

use ash::{ext::debug_utils, vk};

pub const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";
pub const DEBUG_UTILS: &CStr = debug_utils::NAME;

pub trait Diagnostics: fmt::Debug {
    fn layers(&self) -> Vec<&'static CStr> {
        Vec::new()
    }

    fn extensions(&self) -> Vec<&'static CStr> {
        Vec::new()
    }

    /// Messenger to create on the instance, also chained onto instance
    /// creation itself.
    fn messenger_info(&self) -> Option<vk::DebugUtilsMessengerCreateInfoEXT<'static>> {
        None
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Silent;

impl Diagnostics for Silent {}

/// Lowest message severity forwarded from the validation layer.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Verbose,
    Info,
    #[default]
    Warning,
    Error,
}

impl Severity {
    pub fn flags(self) -> vk::DebugUtilsMessageSeverityFlagsEXT {
        use vk::DebugUtilsMessageSeverityFlagsEXT as F;
        match self {
            Severity::Verbose => F::VERBOSE | F::INFO | F::WARNING | F::ERROR,
            Severity::Info => F::INFO | F::WARNING | F::ERROR,
            Severity::Warning => F::WARNING | F::ERROR,
            Severity::Error => F::ERROR,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Validation {
    pub level: Severity,
}

impl Diagnostics for Validation {
    fn layers(&self) -> Vec<&'static CStr> {
        vec![VALIDATION_LAYER]
    }

    fn extensions(&self) -> Vec<&'static CStr> {
        vec![DEBUG_UTILS]
    }

    fn messenger_info(&self) -> Option<vk::DebugUtilsMessengerCreateInfoEXT<'static>> {
        Some(
            vk::DebugUtilsMessengerCreateInfoEXT::default()
                .message_severity(self.level.flags())
                .message_type(
                    vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                        | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                        | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
                )
                .pfn_user_callback(Some(forward_to_tracing)),
        )
    }
}

/// `Validation` at `level`, or `Silent` when `None`.
pub fn for_level(level: Option<Severity>) -> Box<dyn Diagnostics> {
    match level {
        Some(level) => Box::new(Validation { level }),
        None => Box::new(Silent),
    }
}

fn kind_label(types: vk::DebugUtilsMessageTypeFlagsEXT) -> &'static str {
    if types.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION) {
        "validation"
    } else if types.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE) {
        "performance"
    } else {
        "general"
    }
}

unsafe extern "system" fn forward_to_tracing(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user: *mut c_void,
) -> vk::Bool32 {
    if data.is_null() {
        return vk::FALSE;
    }
    // SAFETY: the layer passes a valid callback record for the duration of
    // the call.
    let data = unsafe { &*data };
    if data.p_message.is_null() {
        return vk::FALSE;
    }
    // SAFETY: non-null and NUL-terminated per the callback contract.
    let message = unsafe { CStr::from_ptr(data.p_message) }.to_string_lossy();
    let kind = kind_label(types);

    use vk::DebugUtilsMessageSeverityFlagsEXT as F;
    if severity.contains(F::ERROR) {
        tracing::error!(target: "tether::validation", kind, "{message}");
    } else if severity.contains(F::WARNING) {
        tracing::warn!(target: "tether::validation", kind, "{message}");
    } else if severity.contains(F::INFO) {
        tracing::info!(target: "tether::validation", kind, "{message}");
    } else {
        tracing::trace!(target: "tether::validation", kind, "{message}");
    }
    vk::FALSE
}
