//! Adapter capability snapshots and adapter selection.
//!
//! Selection works on plain [`AdapterInfo`] values so the policy can be checked
//! without a GPU. [`AdapterInfo::query`] fills one in from a live physical device.

use crate::error::{GpuError, Result};
use ash::vk;
use std::collections::HashSet;
use std::ffi::CStr;

/// GPU vendor identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
    Apple,
    Other(u32),
}

impl GpuVendor {
    /// Identify vendor from PCI vendor ID.
    pub fn from_vendor_id(id: u32) -> Self {
        match id {
            0x10DE => Self::Nvidia,
            0x1002 => Self::Amd,
            0x8086 => Self::Intel,
            0x106B => Self::Apple,
            other => Self::Other(other),
        }
    }
}

/// One queue family as seen by adapter selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilyInfo {
    pub flags: vk::QueueFlags,
    pub queue_count: u32,
    /// Whether this family can present to the target surface.
    pub supports_present: bool,
}

/// Everything adapter selection needs to know about one physical device.
#[derive(Debug, Clone)]
pub struct AdapterInfo {
    pub name: String,
    pub vendor: GpuVendor,
    pub device_type: vk::PhysicalDeviceType,
    pub api_version: u32,
    pub max_image_dimension_2d: u32,
    pub max_sampler_anisotropy: f32,
    pub device_local_memory_mb: u64,
    pub queue_families: Vec<QueueFamilyInfo>,
    pub extensions: HashSet<String>,
    pub sampler_anisotropy: bool,
    pub sample_rate_shading: bool,
    pub surface_format_count: usize,
    pub present_mode_count: usize,
    pub color_sample_counts: vk::SampleCountFlags,
    pub depth_sample_counts: vk::SampleCountFlags,
}

impl AdapterInfo {
    /// Snapshot a physical device against a surface.
    ///
    /// # Safety
    /// The instance, physical device and surface must be valid.
    pub unsafe fn query(
        instance: &ash::Instance,
        surface_loader: &ash::khr::surface::Instance,
        surface: vk::SurfaceKHR,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Self> {
        let properties = instance.get_physical_device_properties(physical_device);
        let features = instance.get_physical_device_features(physical_device);
        let memory_properties = instance.get_physical_device_memory_properties(physical_device);

        let extensions: HashSet<String> = instance
            .enumerate_device_extension_properties(physical_device)?
            .iter()
            .filter_map(|ext| {
                CStr::from_ptr(ext.extension_name.as_ptr())
                    .to_str()
                    .ok()
                    .map(String::from)
            })
            .collect();

        let queue_families = instance
            .get_physical_device_queue_family_properties(physical_device)
            .iter()
            .enumerate()
            .map(|(index, family)| {
                let supports_present = surface_loader
                    .get_physical_device_surface_support(physical_device, index as u32, surface)?;
                Ok(QueueFamilyInfo {
                    flags: family.queue_flags,
                    queue_count: family.queue_count,
                    supports_present,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        // Surface queries fail on adapters that cannot see the surface at all;
        // report that as "no formats" rather than aborting enumeration.
        let surface_format_count = surface_loader
            .get_physical_device_surface_formats(physical_device, surface)
            .map_or(0, |f| f.len());
        let present_mode_count = surface_loader
            .get_physical_device_surface_present_modes(physical_device, surface)
            .map_or(0, |m| m.len());

        let device_local_memory_mb = memory_properties
            .memory_heaps
            .iter()
            .take(memory_properties.memory_heap_count as usize)
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size / (1024 * 1024))
            .sum();

        Ok(Self {
            name: CStr::from_ptr(properties.device_name.as_ptr())
                .to_string_lossy()
                .into_owned(),
            vendor: GpuVendor::from_vendor_id(properties.vendor_id),
            device_type: properties.device_type,
            api_version: properties.api_version,
            max_image_dimension_2d: properties.limits.max_image_dimension2_d,
            max_sampler_anisotropy: properties.limits.max_sampler_anisotropy,
            device_local_memory_mb,
            queue_families,
            extensions,
            sampler_anisotropy: features.sampler_anisotropy == vk::TRUE,
            sample_rate_shading: features.sample_rate_shading == vk::TRUE,
            surface_format_count,
            present_mode_count,
            color_sample_counts: properties.limits.framebuffer_color_sample_counts,
            depth_sample_counts: properties.limits.framebuffer_depth_sample_counts,
        })
    }

    /// Highest sample count usable for both colour and depth attachments.
    pub fn max_usable_sample_count(&self) -> vk::SampleCountFlags {
        max_usable_sample_count(self.color_sample_counts, self.depth_sample_counts)
    }

    /// Get a human-readable summary of the adapter.
    pub fn summary(&self) -> String {
        format!(
            "{} ({:?}, {:?}) - Vulkan {}.{}.{} - {} MB VRAM",
            self.name,
            self.vendor,
            self.device_type,
            vk::api_version_major(self.api_version),
            vk::api_version_minor(self.api_version),
            vk::api_version_patch(self.api_version),
            self.device_local_memory_mb,
        )
    }
}

/// What the engine needs from an adapter.
#[derive(Debug, Clone)]
pub struct DeviceRequirements {
    pub extensions: Vec<&'static CStr>,
    pub sampler_anisotropy: bool,
    pub sample_rate_shading: bool,
    pub min_api_version: u32,
}

impl Default for DeviceRequirements {
    fn default() -> Self {
        Self {
            extensions: vec![ash::khr::swapchain::NAME],
            sampler_anisotropy: true,
            sample_rate_shading: true,
            // Dynamic rendering is core in 1.3.
            min_api_version: vk::API_VERSION_1_3,
        }
    }
}

impl DeviceRequirements {
    /// Required extensions the adapter does not expose.
    pub fn missing_extensions(&self, adapter: &AdapterInfo) -> Vec<String> {
        self.extensions
            .iter()
            .map(|ext| ext.to_string_lossy().into_owned())
            .filter(|name| !adapter.extensions.contains(name))
            .collect()
    }

    /// Why the adapter cannot be used, or `None` if it qualifies.
    pub fn unsuitability(&self, adapter: &AdapterInfo) -> Option<String> {
        if !api_at_least(adapter.api_version, self.min_api_version) {
            return Some("Vulkan version too old".to_string());
        }
        if QueueFamilyIndices::resolve(&adapter.queue_families).is_none() {
            return Some("no graphics and present queue families".to_string());
        }
        let missing = self.missing_extensions(adapter);
        if !missing.is_empty() {
            return Some(format!("missing extensions: {}", missing.join(", ")));
        }
        if self.sampler_anisotropy && !adapter.sampler_anisotropy {
            return Some("no anisotropic sampling".to_string());
        }
        if self.sample_rate_shading && !adapter.sample_rate_shading {
            return Some("no sample-rate shading".to_string());
        }
        if adapter.surface_format_count == 0 || adapter.present_mode_count == 0 {
            return Some("surface has no formats or present modes".to_string());
        }
        None
    }
}

fn api_at_least(version: u32, minimum: u32) -> bool {
    let major = vk::api_version_major(version);
    let minor = vk::api_version_minor(version);
    let min_major = vk::api_version_major(minimum);
    let min_minor = vk::api_version_minor(minimum);
    (major, minor) >= (min_major, min_minor)
}

/// Resolved queue family indices. Fixed once the device is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilyIndices {
    /// Pick graphics and present families, preferring one family that does both.
    pub fn resolve(families: &[QueueFamilyInfo]) -> Option<Self> {
        let is_graphics = |f: &QueueFamilyInfo| {
            f.queue_count > 0 && f.flags.contains(vk::QueueFlags::GRAPHICS)
        };

        if let Some(index) = families
            .iter()
            .position(|f| is_graphics(f) && f.supports_present)
        {
            let index = index as u32;
            return Some(Self {
                graphics: index,
                present: index,
            });
        }

        let graphics = families.iter().position(is_graphics)?;
        let present = families
            .iter()
            .position(|f| f.queue_count > 0 && f.supports_present)?;

        Some(Self {
            graphics: graphics as u32,
            present: present as u32,
        })
    }

    /// Whether graphics and present share one family.
    pub fn is_shared(&self) -> bool {
        self.graphics == self.present
    }

    /// Distinct family indices, for queue creation.
    pub fn unique(&self) -> Vec<u32> {
        if self.is_shared() {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }
}

/// Selection score. Discrete adapters always beat everything else; the
/// maximum 2D image dimension breaks ties within a type.
pub fn score_adapter(adapter: &AdapterInfo) -> u64 {
    let type_weight = match adapter.device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 1_000_000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 100_000,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 50_000,
        _ => 0,
    };
    type_weight + u64::from(adapter.max_image_dimension_2d)
}

/// Select the best suitable adapter and its queue families.
///
/// Fails with [`GpuError::ExtensionNotSupported`] when every adapter lacks a
/// required extension, and [`GpuError::NoSuitableDevice`] otherwise.
pub fn select_adapter(
    adapters: &[AdapterInfo],
    requirements: &DeviceRequirements,
) -> Result<(usize, QueueFamilyIndices)> {
    let mut best: Option<(usize, u64, QueueFamilyIndices)> = None;
    // Extensions no adapter seen so far exposes.
    let mut missing_everywhere: Option<Vec<String>> = None;

    for (index, adapter) in adapters.iter().enumerate() {
        let missing = requirements.missing_extensions(adapter);
        missing_everywhere = Some(match missing_everywhere {
            None => missing,
            Some(previous) => previous.into_iter().filter(|name| missing.contains(name)).collect(),
        });

        if let Some(reason) = requirements.unsuitability(adapter) {
            tracing::debug!("Skipping adapter {}: {reason}", adapter.name);
            continue;
        }
        let Some(queues) = QueueFamilyIndices::resolve(&adapter.queue_families) else {
            continue;
        };

        let score = score_adapter(adapter);
        if best.map_or(true, |(_, best_score, _)| score > best_score) {
            best = Some((index, score, queues));
        }
    }

    match (best, missing_everywhere) {
        (Some((index, _, queues)), _) => Ok((index, queues)),
        (None, Some(missing)) if !missing.is_empty() => Err(GpuError::ExtensionNotSupported(missing.join(", "))),
        (None, _) => Err(GpuError::NoSuitableDevice),
    }
}

/// Highest sample count present in both the colour and depth masks.
pub fn max_usable_sample_count(
    color: vk::SampleCountFlags,
    depth: vk::SampleCountFlags,
) -> vk::SampleCountFlags {
    let counts = color & depth;
    [
        vk::SampleCountFlags::TYPE_64,
        vk::SampleCountFlags::TYPE_32,
        vk::SampleCountFlags::TYPE_16,
        vk::SampleCountFlags::TYPE_8,
        vk::SampleCountFlags::TYPE_4,
        vk::SampleCountFlags::TYPE_2,
    ]
    .into_iter()
    .find(|&bit| counts.contains(bit))
    .unwrap_or(vk::SampleCountFlags::TYPE_1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter(name: &str, device_type: vk::PhysicalDeviceType, dim: u32) -> AdapterInfo {
        AdapterInfo {
            name: name.to_string(),
            vendor: GpuVendor::Other(0),
            device_type,
            api_version: vk::API_VERSION_1_3,
            max_image_dimension_2d: dim,
            max_sampler_anisotropy: 16.0,
            device_local_memory_mb: 4096,
            queue_families: vec![QueueFamilyInfo {
                flags: vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER,
                queue_count: 1,
                supports_present: true,
            }],
            extensions: ["VK_KHR_swapchain".to_string()].into_iter().collect(),
            sampler_anisotropy: true,
            sample_rate_shading: true,
            surface_format_count: 2,
            present_mode_count: 1,
            color_sample_counts: vk::SampleCountFlags::TYPE_1 | vk::SampleCountFlags::TYPE_4,
            depth_sample_counts: vk::SampleCountFlags::TYPE_1 | vk::SampleCountFlags::TYPE_4,
        }
    }

    #[test]
    fn vendor_identification() {
        assert_eq!(GpuVendor::from_vendor_id(0x10DE), GpuVendor::Nvidia);
        assert_eq!(GpuVendor::from_vendor_id(0x1002), GpuVendor::Amd);
        assert_eq!(GpuVendor::from_vendor_id(0x8086), GpuVendor::Intel);
    }

    #[test]
    fn combined_family_used_for_both_queues() {
        let adapters = [adapter("only", vk::PhysicalDeviceType::INTEGRATED_GPU, 8192)];
        let (index, queues) = select_adapter(&adapters, &DeviceRequirements::default()).unwrap();

        assert_eq!(index, 0);
        assert_eq!(queues.graphics, 0);
        assert_eq!(queues.present, 0);
        assert!(queues.is_shared());
        assert_eq!(queues.unique(), vec![0]);
    }

    #[test]
    fn combined_family_preferred_over_split() {
        let families = [
            QueueFamilyInfo {
                flags: vk::QueueFlags::GRAPHICS,
                queue_count: 1,
                supports_present: false,
            },
            QueueFamilyInfo {
                flags: vk::QueueFlags::TRANSFER,
                queue_count: 1,
                supports_present: true,
            },
            QueueFamilyInfo {
                flags: vk::QueueFlags::GRAPHICS,
                queue_count: 1,
                supports_present: true,
            },
        ];
        let queues = QueueFamilyIndices::resolve(&families).unwrap();
        assert_eq!(queues, QueueFamilyIndices { graphics: 2, present: 2 });
    }

    #[test]
    fn split_families_when_no_combined_one() {
        let families = [
            QueueFamilyInfo {
                flags: vk::QueueFlags::GRAPHICS,
                queue_count: 1,
                supports_present: false,
            },
            QueueFamilyInfo {
                flags: vk::QueueFlags::TRANSFER,
                queue_count: 1,
                supports_present: true,
            },
        ];
        let queues = QueueFamilyIndices::resolve(&families).unwrap();
        assert_eq!(queues, QueueFamilyIndices { graphics: 0, present: 1 });
        assert_eq!(queues.unique(), vec![0, 1]);
    }

    #[test]
    fn discrete_beats_larger_integrated() {
        let adapters = [
            adapter("igpu", vk::PhysicalDeviceType::INTEGRATED_GPU, 32768),
            adapter("dgpu", vk::PhysicalDeviceType::DISCRETE_GPU, 8192),
        ];
        let (index, _) = select_adapter(&adapters, &DeviceRequirements::default()).unwrap();
        assert_eq!(index, 1);
    }

    #[test]
    fn image_dimension_breaks_ties() {
        let adapters = [
            adapter("small", vk::PhysicalDeviceType::DISCRETE_GPU, 8192),
            adapter("large", vk::PhysicalDeviceType::DISCRETE_GPU, 16384),
        ];
        let (index, _) = select_adapter(&adapters, &DeviceRequirements::default()).unwrap();
        assert_eq!(index, 1);
    }

    #[test]
    fn unsuitable_adapters_filtered() {
        let mut no_swapchain = adapter("a", vk::PhysicalDeviceType::DISCRETE_GPU, 16384);
        no_swapchain.extensions.clear();
        let mut no_aniso = adapter("b", vk::PhysicalDeviceType::DISCRETE_GPU, 16384);
        no_aniso.sampler_anisotropy = false;
        let mut no_formats = adapter("c", vk::PhysicalDeviceType::DISCRETE_GPU, 16384);
        no_formats.surface_format_count = 0;
        let mut old = adapter("d", vk::PhysicalDeviceType::DISCRETE_GPU, 16384);
        old.api_version = vk::API_VERSION_1_2;

        let requirements = DeviceRequirements::default();
        for a in [&no_swapchain, &no_aniso, &no_formats, &old] {
            assert!(requirements.unsuitability(a).is_some(), "{} accepted", a.name);
        }

        let adapters = [no_swapchain, no_aniso, no_formats, old];
        assert!(matches!(
            select_adapter(&adapters, &requirements),
            Err(GpuError::NoSuitableDevice)
        ));
    }

    #[test]
    fn extension_missing_on_every_adapter() {
        let mut integrated = adapter("a", vk::PhysicalDeviceType::INTEGRATED_GPU, 8192);
        integrated.extensions.clear();
        let mut discrete = adapter("b", vk::PhysicalDeviceType::DISCRETE_GPU, 16384);
        discrete.extensions.clear();

        match select_adapter(&[integrated, discrete], &DeviceRequirements::default()) {
            Err(GpuError::ExtensionNotSupported(names)) => assert_eq!(names, "VK_KHR_swapchain"),
            other => panic!("unexpected selection: {other:?}"),
        }
    }

    #[test]
    fn no_adapters_is_fatal() {
        assert!(matches!(
            select_adapter(&[], &DeviceRequirements::default()),
            Err(GpuError::NoSuitableDevice)
        ));
    }

    #[test]
    fn sample_count_intersects_color_and_depth() {
        let color = vk::SampleCountFlags::TYPE_1
            | vk::SampleCountFlags::TYPE_2
            | vk::SampleCountFlags::TYPE_4
            | vk::SampleCountFlags::TYPE_8;
        let depth = vk::SampleCountFlags::TYPE_1
            | vk::SampleCountFlags::TYPE_2
            | vk::SampleCountFlags::TYPE_4;
        assert_eq!(
            max_usable_sample_count(color, depth),
            vk::SampleCountFlags::TYPE_4
        );
        assert_eq!(
            max_usable_sample_count(vk::SampleCountFlags::TYPE_1, depth),
            vk::SampleCountFlags::TYPE_1
        );
    }
}
