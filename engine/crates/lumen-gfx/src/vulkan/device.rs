use std::ffi::{CStr, CString, c_char};

use ash::vk;
use itertools::Itertools;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

use crate::error::{GfxError, GfxResult};

/// instance、physical device、device 以及唯一的 queue
///
/// 只使用一个全能的 queue family：graphics、compute 和 transfer 都在同一个 queue 上提交
pub struct VulkanDevice {
    pub(crate) instance: ash::Instance,
    pub(crate) physical_device: vk::PhysicalDevice,
    pub(crate) device: ash::Device,

    pub(crate) queue: vk::Queue,
    pub(crate) queue_family_index: u32,

    pub(crate) surface_pf: ash::khr::surface::Instance,
    pub(crate) swapchain_pf: ash::khr::swapchain::Device,

    /// vk 基础函数的接口
    ///
    /// 在 drop 之后，会卸载 dll，因此需要确保该字段最后 drop
    pub(crate) vk_entry: ash::Entry,
}

// new & init
impl VulkanDevice {
    /// `display` 为 None 时不启用 surface 相关的扩展，只能离屏渲染
    pub fn new(app_name: &str, display: Option<RawDisplayHandle>) -> GfxResult<Self> {
        let vk_entry = unsafe { ash::Entry::load()? };

        let app_name = CString::new(app_name).map_err(|_| GfxError::InvalidDesc("app name contains NUL".to_string()))?;
        let app_info = vk::ApplicationInfo::default()
            .application_name(&app_name)
            .engine_name(c"lumen")
            .api_version(vk::API_VERSION_1_3);

        let mut instance_exts: Vec<*const c_char> = vec![];
        if let Some(display) = display {
            instance_exts.extend_from_slice(ash_window::enumerate_required_extensions(display)?);
        }
        let instance_ci = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&instance_exts);
        let instance = unsafe { vk_entry.create_instance(&instance_ci, None)? };

        let (physical_device, queue_family_index) = Self::pick_physical_device(&instance)?;

        let mut device_exts: Vec<*const c_char> = vec![];
        if display.is_some() {
            device_exts.push(ash::khr::swapchain::NAME.as_ptr());
        }
        let queue_priorities = [1.0];
        let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
            .queue_family_index(queue_family_index)
            .queue_priorities(&queue_priorities)];
        // image barrier 使用 synchronization2
        let mut features13 = vk::PhysicalDeviceVulkan13Features::default().synchronization2(true);
        let device_ci = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&device_exts)
            .push_next(&mut features13);
        let device = unsafe { instance.create_device(physical_device, &device_ci, None)? };
        let queue = unsafe { device.get_device_queue(queue_family_index, 0) };

        let surface_pf = ash::khr::surface::Instance::new(&vk_entry, &instance);
        let swapchain_pf = ash::khr::swapchain::Device::new(&instance, &device);

        log::info!("vulkan device created, queue family {}", queue_family_index);

        Ok(Self {
            instance,
            physical_device,
            device,
            queue,
            queue_family_index,
            surface_pf,
            swapchain_pf,
            vk_entry,
        })
    }

    /// 优先选择独立显卡，如果没有则选择第一个可用的显卡
    fn pick_physical_device(instance: &ash::Instance) -> GfxResult<(vk::PhysicalDevice, u32)> {
        let candidates = unsafe { instance.enumerate_physical_devices()? }
            .into_iter()
            .filter_map(|pdevice| {
                let props = unsafe { instance.get_physical_device_properties(pdevice) };
                let name = unsafe { CStr::from_ptr(props.device_name.as_ptr()) };
                log::info!("found gpu: {:?}", name);

                // 全能的 Queue：graphics, compute, transfer
                let queue_family = unsafe { instance.get_physical_device_queue_family_properties(pdevice) }
                    .iter()
                    .position(|p| p.queue_flags.contains(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE))?;
                Some((pdevice, queue_family as u32, props.device_type))
            })
            .collect_vec();

        candidates
            .iter()
            .find_or_first(|(_, _, ty)| *ty == vk::PhysicalDeviceType::DISCRETE_GPU)
            .map(|(pdevice, family, _)| (*pdevice, *family))
            .ok_or(GfxError::InvalidDesc("no gpu with a graphics queue".to_string()))
    }

    /// surface 的创建属于窗口系统，这里只是方便的封装
    pub fn create_surface(&self, display: RawDisplayHandle, window: RawWindowHandle) -> GfxResult<vk::SurfaceKHR> {
        let surface = unsafe { ash_window::create_surface(&self.vk_entry, &self.instance, display, window, None)? };
        Ok(surface)
    }
}

// getters
impl VulkanDevice {
    #[inline]
    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    #[inline]
    pub fn queue_family_index(&self) -> u32 {
        self.queue_family_index
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}
