//! Device context: adapter selection, logical device and queues.

use crate::capabilities::{select_adapter, AdapterInfo, DeviceRequirements, QueueFamilyIndices};
use crate::error::{GpuError, Result};
use crate::instance::create_instance;
use crate::memory::GpuAllocator;
use crate::surface::{Surface, SurfaceSupport};
use ash::vk;
use parking_lot::Mutex;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use std::ffi::c_char;
use std::sync::Arc;

/// Owns the Vulkan instance, surface, logical device and everything created
/// directly from them. Dropped last.
pub struct DeviceContext {
    // Entry must be kept alive for the lifetime of the context
    #[allow(dead_code)]
    entry: ash::Entry,
    instance: ash::Instance,
    surface: Surface,
    physical_device: vk::PhysicalDevice,
    device: Arc<ash::Device>,
    adapter: AdapterInfo,
    allocator: Mutex<GpuAllocator>,
    swapchain_loader: ash::khr::swapchain::Device,

    queue_families: QueueFamilyIndices,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    msaa_samples: vk::SampleCountFlags,
}

impl DeviceContext {
    /// Get the Vulkan device handle.
    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    /// Shared handle to the device, for objects that outlive a borrow.
    pub fn device_arc(&self) -> Arc<ash::Device> {
        self.device.clone()
    }

    /// Get the Vulkan instance handle.
    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Snapshot of the selected adapter.
    pub fn adapter(&self) -> &AdapterInfo {
        &self.adapter
    }

    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    /// Query the surface against the selected adapter.
    pub fn surface_support(&self) -> Result<SurfaceSupport> {
        self.surface.support(self.physical_device)
    }

    pub fn swapchain_loader(&self) -> &ash::khr::swapchain::Device {
        &self.swapchain_loader
    }

    /// Queue family indices, resolved once at construction.
    pub fn queue_families(&self) -> QueueFamilyIndices {
        self.queue_families
    }

    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    /// Sample count used for colour and depth attachments.
    pub fn msaa_samples(&self) -> vk::SampleCountFlags {
        self.msaa_samples
    }

    /// Get access to the GPU allocator.
    pub fn allocator(&self) -> &Mutex<GpuAllocator> {
        &self.allocator
    }

    /// Format feature flags for optimal tiling.
    pub fn optimal_format_features(&self, format: vk::Format) -> vk::FormatFeatureFlags {
        unsafe {
            self.instance
                .get_physical_device_format_properties(self.physical_device, format)
                .optimal_tiling_features
        }
    }

    /// First candidate format usable as an optimal-tiling depth attachment.
    pub fn find_depth_format(&self) -> Result<vk::Format> {
        [
            vk::Format::D32_SFLOAT,
            vk::Format::D32_SFLOAT_S8_UINT,
            vk::Format::D24_UNORM_S8_UINT,
        ]
        .into_iter()
        .find(|&format| {
            self.optimal_format_features(format)
                .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
        })
        .ok_or(GpuError::UnsupportedFormat {
            format: vk::Format::D32_SFLOAT,
            operation: "depth attachment",
        })
    }

    /// Wait for device to be idle.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.device.device_wait_idle()?;
        }
        Ok(())
    }
}

impl Drop for DeviceContext {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();

            // Frees every VkDeviceMemory; must precede device destruction
            self.allocator.lock().shutdown();

            self.device.destroy_device(None);
            self.surface.destroy();
            self.instance.destroy_instance(None);
        }
        tracing::info!("Device context destroyed");
    }
}

/// Builder for a [`DeviceContext`].
pub struct DeviceContextBuilder {
    app_name: String,
    enable_validation: bool,
    enable_msaa: bool,
    max_samples: vk::SampleCountFlags,
    requirements: DeviceRequirements,
}

impl Default for DeviceContextBuilder {
    fn default() -> Self {
        Self {
            app_name: "Prism".to_string(),
            enable_validation: cfg!(debug_assertions),
            enable_msaa: true,
            max_samples: vk::SampleCountFlags::TYPE_64,
            requirements: DeviceRequirements::default(),
        }
    }
}

impl DeviceContextBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the application name.
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    /// Enable or disable validation layers.
    pub fn validation(mut self, enable: bool) -> Self {
        self.enable_validation = enable;
        self
    }

    /// Enable multisampling, capped at `max_samples`.
    pub fn msaa(mut self, enable: bool, max_samples: vk::SampleCountFlags) -> Self {
        self.enable_msaa = enable;
        self.max_samples = max_samples;
        self
    }

    /// Override the adapter requirements.
    pub fn requirements(mut self, requirements: DeviceRequirements) -> Self {
        self.requirements = requirements;
        self
    }

    /// Create the instance and surface, select an adapter and open the device.
    pub fn build(self, display: RawDisplayHandle, window: RawWindowHandle) -> Result<DeviceContext> {
        let entry = unsafe { ash::Entry::load() }.map_err(|e| GpuError::Loading(e.to_string()))?;

        let instance =
            unsafe { create_instance(&entry, &self.app_name, display, self.enable_validation) }?;

        let surface = match unsafe { Surface::new(&entry, &instance, display, window) } {
            Ok(surface) => surface,
            Err(e) => {
                unsafe { instance.destroy_instance(None) };
                return Err(e);
            }
        };

        match unsafe { self.open_device(&instance, &surface) } {
            Ok(opened) => {
                let swapchain_loader = ash::khr::swapchain::Device::new(&instance, &opened.device);
                let device = Arc::new(opened.device);

                let allocator = match unsafe {
                    GpuAllocator::new(&instance, device.clone(), opened.physical_device)
                } {
                    Ok(allocator) => allocator,
                    Err(e) => {
                        unsafe {
                            device.destroy_device(None);
                            surface.destroy();
                            instance.destroy_instance(None);
                        }
                        return Err(e);
                    }
                };

                Ok(DeviceContext {
                    entry,
                    instance,
                    surface,
                    physical_device: opened.physical_device,
                    device,
                    adapter: opened.adapter,
                    allocator: Mutex::new(allocator),
                    swapchain_loader,
                    queue_families: opened.queue_families,
                    graphics_queue: opened.graphics_queue,
                    present_queue: opened.present_queue,
                    msaa_samples: opened.msaa_samples,
                })
            }
            Err(e) => {
                unsafe {
                    surface.destroy();
                    instance.destroy_instance(None);
                }
                Err(e)
            }
        }
    }

    unsafe fn open_device(&self, instance: &ash::Instance, surface: &Surface) -> Result<OpenedDevice> {
        let physical_devices = instance.enumerate_physical_devices()?;
        if physical_devices.is_empty() {
            return Err(GpuError::NoSuitableDevice);
        }

        let adapters = physical_devices
            .iter()
            .map(|&pd| AdapterInfo::query(instance, &surface.loader, surface.handle, pd))
            .collect::<Result<Vec<_>>>()?;

        let (index, queue_families) = select_adapter(&adapters, &self.requirements)?;
        let physical_device = physical_devices[index];
        let adapter = adapters
            .into_iter()
            .nth(index)
            .ok_or(GpuError::NoSuitableDevice)?;

        tracing::info!("Selected GPU: {}", adapter.summary());

        let msaa_samples = if self.enable_msaa {
            cap_samples(adapter.max_usable_sample_count(), self.max_samples)
        } else {
            vk::SampleCountFlags::TYPE_1
        };
        tracing::debug!(
            "Queue families: graphics {}, present {}; MSAA {:?}",
            queue_families.graphics,
            queue_families.present,
            msaa_samples
        );

        let device = create_device(instance, physical_device, &queue_families, &self.requirements)?;
        let graphics_queue = device.get_device_queue(queue_families.graphics, 0);
        let present_queue = device.get_device_queue(queue_families.present, 0);

        Ok(OpenedDevice {
            physical_device,
            adapter,
            device,
            queue_families,
            graphics_queue,
            present_queue,
            msaa_samples,
        })
    }
}

struct OpenedDevice {
    physical_device: vk::PhysicalDevice,
    adapter: AdapterInfo,
    device: ash::Device,
    queue_families: QueueFamilyIndices,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    msaa_samples: vk::SampleCountFlags,
}

/// Lower `samples` to `cap` when it exceeds it. Both are single-bit counts.
pub fn cap_samples(samples: vk::SampleCountFlags, cap: vk::SampleCountFlags) -> vk::SampleCountFlags {
    if cap.is_empty() || samples.as_raw() <= cap.as_raw() {
        samples
    } else {
        cap
    }
}

/// Create the logical device with one queue per distinct family.
///
/// # Safety
/// The instance and physical device must be valid.
unsafe fn create_device(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    queue_families: &QueueFamilyIndices,
    requirements: &DeviceRequirements,
) -> Result<ash::Device> {
    let queue_priority = 1.0_f32;
    let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = queue_families
        .unique()
        .into_iter()
        .map(|family| {
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(family)
                .queue_priorities(std::slice::from_ref(&queue_priority))
        })
        .collect();

    let extension_names: Vec<*const c_char> =
        requirements.extensions.iter().map(|ext| ext.as_ptr()).collect();

    let mut vulkan_1_3_features = vk::PhysicalDeviceVulkan13Features::default()
        .dynamic_rendering(true)
        .synchronization2(true);

    let features = vk::PhysicalDeviceFeatures::default()
        .sampler_anisotropy(requirements.sampler_anisotropy)
        .sample_rate_shading(requirements.sample_rate_shading);

    let mut features2 = vk::PhysicalDeviceFeatures2::default()
        .features(features)
        .push_next(&mut vulkan_1_3_features);

    let device_create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_create_infos)
        .enabled_extension_names(&extension_names)
        .push_next(&mut features2);

    let device = instance
        .create_device(physical_device, &device_create_info, None)
        .map_err(GpuError::from)?;

    Ok(device)
}
