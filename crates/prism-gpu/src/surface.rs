//! Window surface management.
//!
//! The window itself belongs to the windowing layer; this module only needs its
//! raw handles (to create the surface) and its framebuffer size (to size the
//! presentation chain).

use crate::error::{GpuError, Result};
use ash::vk;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use std::time::Duration;

/// Source of the window's current framebuffer size in pixels.
pub trait FramebufferSize {
    fn framebuffer_size(&self) -> (u32, u32);
}

impl<F> FramebufferSize for F
where
    F: Fn() -> (u32, u32),
{
    fn framebuffer_size(&self) -> (u32, u32) {
        self()
    }
}

/// Block until the framebuffer has a non-zero size (i.e. the window is not
/// minimized), polling every `poll_interval`.
pub fn wait_for_nonzero_extent<S>(source: &S, poll_interval: Duration) -> vk::Extent2D
where
    S: FramebufferSize + ?Sized,
{
    let mut logged = false;
    loop {
        let (width, height) = source.framebuffer_size();
        if width > 0 && height > 0 {
            if logged {
                tracing::info!("Framebuffer restored to {width}x{height}");
            }
            return vk::Extent2D { width, height };
        }
        if !logged {
            tracing::info!("Framebuffer is {width}x{height}, waiting for a visible window");
            logged = true;
        }
        std::thread::sleep(poll_interval);
    }
}

/// A presentation surface and its extension loader.
pub struct Surface {
    /// The Vulkan surface handle.
    pub handle: vk::SurfaceKHR,
    /// Surface extension loader.
    pub loader: ash::khr::surface::Instance,
}

impl Surface {
    /// Create a surface for a native window.
    ///
    /// # Safety
    /// The handles must stay valid for the lifetime of the surface.
    pub unsafe fn new(
        entry: &ash::Entry,
        instance: &ash::Instance,
        display: RawDisplayHandle,
        window: RawWindowHandle,
    ) -> Result<Self> {
        let handle = ash_window::create_surface(entry, instance, display, window, None)
            .map_err(|e| GpuError::SurfaceCreation(e.to_string()))?;
        let loader = ash::khr::surface::Instance::new(entry, instance);

        Ok(Self { handle, loader })
    }

    /// Query what the surface supports on a physical device.
    pub fn support(&self, physical_device: vk::PhysicalDevice) -> Result<SurfaceSupport> {
        unsafe {
            let capabilities = self
                .loader
                .get_physical_device_surface_capabilities(physical_device, self.handle)?;
            let formats = self
                .loader
                .get_physical_device_surface_formats(physical_device, self.handle)?;
            let present_modes = self
                .loader
                .get_physical_device_surface_present_modes(physical_device, self.handle)?;

            Ok(SurfaceSupport {
                capabilities,
                formats,
                present_modes,
            })
        }
    }

    /// Destroy the surface.
    ///
    /// # Safety
    /// No swapchain created from this surface may remain.
    pub unsafe fn destroy(&self) {
        self.loader.destroy_surface(self.handle, None);
    }
}

/// Surface query result.
#[derive(Debug, Clone)]
pub struct SurfaceSupport {
    /// Raw surface capabilities.
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported surface formats.
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes.
    pub present_modes: Vec<vk::PresentModeKHR>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn waits_until_window_restored() {
        let polls = Cell::new(0u32);
        let source = || {
            polls.set(polls.get() + 1);
            if polls.get() < 4 {
                (0, 0)
            } else {
                (800, 600)
            }
        };

        let extent = wait_for_nonzero_extent(&source, Duration::from_millis(1));
        assert_eq!(extent.width, 800);
        assert_eq!(extent.height, 600);
        assert_eq!(polls.get(), 4);
    }

    #[test]
    fn zero_in_one_axis_still_waits() {
        let polls = Cell::new(0u32);
        let source = || {
            polls.set(polls.get() + 1);
            if polls.get() == 1 {
                (1024, 0)
            } else {
                (1024, 768)
            }
        };

        let extent = wait_for_nonzero_extent(&source, Duration::ZERO);
        assert_eq!((extent.width, extent.height), (1024, 768));
        assert_eq!(polls.get(), 2);
    }
}
