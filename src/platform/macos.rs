//! macOS backend: per-process CGEventTaps attached to the loop thread's CFRunLoop

use std::cell::Cell;
use std::ffi::{c_char, c_void, CStr};
use std::ptr;
use std::rc::Rc;
use std::time::Duration;

use core_foundation::base::{CFTypeRef, TCFType};
use core_foundation::boolean::CFBoolean;
use core_foundation::dictionary::{CFDictionary, CFDictionaryRef};
use core_foundation::runloop::{
    kCFRunLoopCommonModes, kCFRunLoopDefaultMode, CFRunLoop, CFRunLoopSource,
};
use core_foundation::string::CFString;
use core_graphics::event::{
    CGEvent, CGEventFlags, CGEventTap, CGEventTapLocation, CGEventTapOptions,
    CGEventTapPlacement, CGEventTapProxy, CGEventType, EventField,
};
use objc::rc::autoreleasepool;
use objc::runtime::Object;
use tracing::{debug, warn};

use crate::tap::{intercept, Disposition, EventKind, EventMask, InterceptedEvent, ModifierFlags};

use super::{
    Hook, HookBackend, HookError, PermissionError, Pid, ProcessInfo, ProcessSource, RunLoop,
};

#[link(name = "CoreGraphics", kind = "framework")]
extern "C" {
    fn CGEventTapEnable(tap: CFTypeRef, enable: bool);
}

#[link(name = "CoreFoundation", kind = "framework")]
extern "C" {
    fn CFMachPortInvalidate(port: CFTypeRef);
}

#[link(name = "AppKit", kind = "framework")]
extern "C" {}

#[link(name = "ApplicationServices", kind = "framework")]
extern "C" {
    fn AXIsProcessTrustedWithOptions(options: CFDictionaryRef) -> bool;
}

/// Checks (and if needed prompts for) the Accessibility permission
pub fn check_accessibility() -> Result<(), PermissionError> {
    let key = CFString::new("AXTrustedCheckOptionPrompt");
    let value = CFBoolean::true_value();
    let options = CFDictionary::from_CFType_pairs(&[(key.as_CFType(), value.as_CFType())]);

    if unsafe { AXIsProcessTrustedWithOptions(options.as_concrete_TypeRef()) } {
        Ok(())
    } else {
        Err(PermissionError::AccessibilityDenied)
    }
}

unsafe fn nsstring_to_string(ns_str: *mut Object) -> Option<String> {
    if ns_str.is_null() {
        return None;
    }
    let chars: *const c_char = msg_send![ns_str, UTF8String];
    if chars.is_null() {
        return None;
    }
    Some(CStr::from_ptr(chars).to_string_lossy().into_owned())
}

/// Running applications as NSWorkspace lists them, named by their localized
/// display name ("Visual Studio Code", not "Code").
///
/// The list only changes while the main thread's run loop runs in a common
/// mode, which the loop thread does.
#[derive(Debug, Default, Clone, Copy)]
pub struct WorkspaceProcesses;

impl ProcessSource for WorkspaceProcesses {
    fn running_processes(&mut self) -> Vec<ProcessInfo> {
        autoreleasepool(|| unsafe {
            let workspace: *mut Object = msg_send![class!(NSWorkspace), sharedWorkspace];
            let apps: *mut Object = msg_send![workspace, runningApplications];
            if apps.is_null() {
                return Vec::new();
            }

            let count: usize = msg_send![apps, count];
            let mut running = Vec::with_capacity(count);
            for index in 0..count {
                let app: *mut Object = msg_send![apps, objectAtIndex: index];
                let pid: Pid = msg_send![app, processIdentifier];
                let name: *mut Object = msg_send![app, localizedName];

                // -1 for applications without a process.
                if pid <= 0 {
                    continue;
                }
                match nsstring_to_string(name) {
                    Some(name) if !name.is_empty() => running.push(ProcessInfo::new(pid, name)),
                    _ => {}
                }
            }
            running
        })
    }
}

/// Creates event taps bound to the run loop of the thread that built it
pub struct EventTapBackend {
    run_loop: CFRunLoop,
}

impl EventTapBackend {
    /// Must be called on the loop thread.
    pub fn for_current_thread() -> Self {
        Self {
            run_loop: CFRunLoop::get_current(),
        }
    }
}

impl HookBackend for EventTapBackend {
    type Hook = EventTapHook;

    fn acquire(&mut self, pid: Pid, name: &str, mask: EventMask) -> Result<EventTapHook, HookError> {
        // Filled in once the tap exists so the callback can re-enable it.
        let port: Rc<Cell<CFTypeRef>> = Rc::new(Cell::new(ptr::null()));
        let callback_port = Rc::clone(&port);

        let callback = move |_proxy: CGEventTapProxy,
                             event_type: CGEventType,
                             event: &CGEvent|
                             -> Option<CGEvent> {
            let kind = match event_type {
                CGEventType::KeyDown => EventKind::KeyDown,
                CGEventType::FlagsChanged => EventKind::FlagsChanged,
                CGEventType::TapDisabledByTimeout | CGEventType::TapDisabledByUserInput => {
                    warn!(pid, "event tap disabled by the system, re-enabling");
                    let port = callback_port.get();
                    if !port.is_null() {
                        unsafe { CGEventTapEnable(port, true) };
                    }
                    return Some(event.clone());
                }
                _ => EventKind::Other,
            };

            let current = event.get_flags();
            let intercepted = InterceptedEvent {
                kind,
                flags: ModifierFlags::from_bits(current.bits()),
                target_pid: event.get_integer_value_field(EventField::EVENT_TARGET_UNIX_PROCESS_ID)
                    as Pid,
            };

            if let Disposition::Rewrite(flags) = intercept(pid, &intercepted) {
                // Toggle only the changed bits so device-dependent bits survive.
                let mut updated = current;
                updated.toggle(CGEventFlags::from_bits_truncate(
                    intercepted.flags.bits() ^ flags.bits(),
                ));
                event.set_flags(updated);
            }

            Some(event.clone())
        };

        let tap = CGEventTap::new(
            CGEventTapLocation::AnnotatedSession,
            CGEventTapPlacement::TailAppendEventTap,
            CGEventTapOptions::Default,
            event_types(mask),
            callback,
        )
        .map_err(|_| HookError::Creation {
            pid,
            name: name.to_string(),
            reason: std::io::Error::last_os_error().to_string(),
        })?;

        let port_ref = tap.mach_port.as_CFTypeRef();
        port.set(port_ref);

        let source = match tap.mach_port.create_runloop_source(0) {
            Ok(source) => source,
            Err(_) => {
                unsafe {
                    CGEventTapEnable(port_ref, false);
                    CFMachPortInvalidate(port_ref);
                }
                return Err(HookError::RunLoopSource { pid });
            }
        };

        unsafe {
            self.run_loop.add_source(&source, kCFRunLoopCommonModes);
        }
        tap.enable();

        debug!(pid, name, ?mask, "event tap attached to run loop");

        Ok(EventTapHook {
            pid,
            tap,
            source,
            run_loop: self.run_loop.clone(),
            enabled: true,
            valid: true,
            attached: true,
        })
    }
}

fn event_types(mask: EventMask) -> Vec<CGEventType> {
    let mut types = Vec::with_capacity(2);
    if mask.contains(EventMask::KEY_DOWN) {
        types.push(CGEventType::KeyDown);
    }
    if mask.contains(EventMask::FLAGS_CHANGED) {
        types.push(CGEventType::FlagsChanged);
    }
    types
}

/// One CGEventTap plus its run loop source.
///
/// Each teardown step runs at most once; `Drop` finishes whatever the tap
/// manager did not.
pub struct EventTapHook {
    pid: Pid,
    tap: CGEventTap<'static>,
    source: CFRunLoopSource,
    run_loop: CFRunLoop,
    enabled: bool,
    valid: bool,
    attached: bool,
}

impl EventTapHook {
    fn port(&self) -> *const c_void {
        self.tap.mach_port.as_CFTypeRef()
    }
}

impl Hook for EventTapHook {
    fn disable(&mut self) {
        if self.enabled {
            unsafe { CGEventTapEnable(self.port(), false) };
            self.enabled = false;
        }
    }

    fn invalidate(&mut self) {
        if self.valid {
            unsafe { CFMachPortInvalidate(self.port()) };
            self.valid = false;
        }
    }

    fn detach(&mut self) {
        if self.attached {
            unsafe {
                self.run_loop.remove_source(&self.source, kCFRunLoopCommonModes);
            }
            self.attached = false;
            debug!(pid = self.pid, "event tap detached from run loop");
        }
    }
}

impl Drop for EventTapHook {
    fn drop(&mut self) {
        self.disable();
        self.invalidate();
        self.detach();
    }
}

/// Services the current thread's CFRunLoop
pub struct CoreFoundationLoop {
    run_loop: CFRunLoop,
}

impl CoreFoundationLoop {
    /// Must be called on the loop thread.
    pub fn for_current_thread() -> Self {
        Self {
            run_loop: CFRunLoop::get_current(),
        }
    }
}

impl RunLoop for CoreFoundationLoop {
    fn run_for(&mut self, timeout: Duration) {
        unsafe {
            CFRunLoop::run_in_mode(kCFRunLoopDefaultMode, timeout, true);
        }
    }

    fn stop(&self) {
        self.run_loop.stop();
    }
}
