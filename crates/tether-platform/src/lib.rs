// SPDX-License-Identifier: CEPL-1.0
//! Window and events on `winit`, driven by pumping rather than by handing
//! the loop over, so the caller decides when to poll and when to block.
#![deny(unsafe_op_in_unsafe_fn)]
use std::{ffi::CStr, time::Duration};

use anyhow::{bail, Context, Result};
use raw_window_handle::{HandleError, HasDisplayHandle, HasWindowHandle, RawDisplayHandle, RawWindowHandle};
use tracing::{debug, info};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    error::OsError,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    platform::pump_events::{EventLoopExtPumpEvents, PumpStatus},
    window::{Window, WindowAttributes, WindowId},
};

pub use winit;

/// What happened since the last poll.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Events {
    pub close_requested: bool,
    /// Latest inner size if the window was resized.
    pub resized: Option<(u32, u32)>,
}

impl Events {
    fn record(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => self.close_requested = true,
            WindowEvent::Resized(size) => self.resized = Some((size.width, size.height)),
            _ => {}
        }
    }
}

struct Shell {
    attributes: WindowAttributes,
    window: Option<Window>,
    error: Option<OsError>,
    events: Events,
}

impl ApplicationHandler for Shell {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        match event_loop.create_window(self.attributes.clone()) {
            Ok(window) => {
                let size = window.inner_size();
                info!("window created ({}x{})", size.width, size.height);
                self.window = Some(window);
            }
            Err(err) => self.error = Some(err),
        }
    }

    fn window_event(&mut self, _: &ActiveEventLoop, id: WindowId, event: WindowEvent) {
        if self.window.as_ref().is_some_and(|w| w.id() == id) {
            self.events.record(&event);
        }
    }
}

/// One window plus the event loop feeding it.
pub struct Platform {
    shell: Shell,
    event_loop: EventLoop<()>,
}

impl Platform {
    pub fn new(title: &str, width: u32, height: u32) -> Result<Self> {
        let event_loop = EventLoop::new().context("create event loop")?;
        let attributes = Window::default_attributes()
            .with_title(title)
            .with_inner_size(PhysicalSize::new(width.max(1), height.max(1)));
        let mut platform = Self {
            shell: Shell {
                attributes,
                window: None,
                error: None,
                events: Events::default(),
            },
            event_loop,
        };

        while platform.shell.window.is_none() {
            let status = platform
                .event_loop
                .pump_app_events(Some(Duration::from_millis(10)), &mut platform.shell);
            if let Some(err) = platform.shell.error.take() {
                bail!("create window: {err}");
            }
            if let PumpStatus::Exit(code) = status {
                bail!("event loop exited ({code}) before the window opened");
            }
        }
        Ok(platform)
    }

    /// Non-blocking.
    pub fn poll(&mut self) -> Events {
        self.pump(Some(Duration::ZERO))
    }

    /// Blocks until at least one event arrives.
    pub fn wait(&mut self) -> Events {
        self.pump(None)
    }

    fn pump(&mut self, timeout: Option<Duration>) -> Events {
        let status = self.event_loop.pump_app_events(timeout, &mut self.shell);
        let mut events = std::mem::take(&mut self.shell.events);
        if let PumpStatus::Exit(code) = status {
            debug!("event loop exited ({code})");
            events.close_requested = true;
        }
        events
    }

    pub fn inner_size(&self) -> (u32, u32) {
        self.shell
            .window
            .as_ref()
            .map_or((0, 0), |w| {
                let size = w.inner_size();
                (size.width, size.height)
            })
    }

    fn window(&self) -> Result<&Window, HandleError> {
        self.shell.window.as_ref().ok_or(HandleError::Unavailable)
    }
}

impl tether_vk::WindowSystem for Platform {
    fn required_extensions(&self) -> tether_vk::Result<Vec<&'static CStr>> {
        let (display, _) = self.raw_handles()?;
        tether_vk::collab::surface_extensions(display)
    }

    fn raw_handles(&self) -> tether_vk::Result<(RawDisplayHandle, RawWindowHandle)> {
        let window = self.window()?;
        Ok((
            window.display_handle()?.as_raw(),
            window.window_handle()?.as_raw(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_keep_latest_size_and_close() {
        let mut events = Events::default();
        events.record(&WindowEvent::Resized(PhysicalSize::new(640, 480)));
        events.record(&WindowEvent::Focused(true));
        events.record(&WindowEvent::Resized(PhysicalSize::new(1280, 720)));
        assert_eq!(events.resized, Some((1280, 720)));
        assert!(!events.close_requested);

        events.record(&WindowEvent::CloseRequested);
        assert!(events.close_requested);
    }

    #[test]
    fn taking_events_resets_them() {
        let mut events = Events::default();
        events.record(&WindowEvent::Destroyed);
        let taken = std::mem::take(&mut events);
        assert!(taken.close_requested);
        assert_eq!(events, Events::default());
    }
}
