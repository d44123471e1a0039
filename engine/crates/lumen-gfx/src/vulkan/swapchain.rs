use ash::vk;

use crate::backend::{GfxAcquire, GfxPresent, GfxSwapchainInfo};
use crate::error::GfxResult;
use crate::vulkan::device::VulkanDevice;

/// 创建 swapchain 时的偏好
#[derive(Clone, Copy, Debug)]
pub struct VulkanPresentSettings {
    pub present_mode: vk::PresentModeKHR,
    pub surface_format: vk::SurfaceFormatKHR,
}
impl Default for VulkanPresentSettings {
    fn default() -> Self {
        Self {
            present_mode: vk::PresentModeKHR::FIFO,
            surface_format: vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        }
    }
}

pub struct VulkanSwapchain {
    handle: vk::SwapchainKHR,

    /// 这里的 image 并非手动创建的，不能释放它们的内存
    images: Vec<vk::Image>,
    /// 每个 image 一个，present 等待这个 semaphore
    render_finished: Vec<vk::Semaphore>,

    format: vk::Format,
    extent: vk::Extent2D,
}

// new & init
impl VulkanSwapchain {
    pub fn new(
        device: &VulkanDevice,
        surface: vk::SurfaceKHR,
        settings: &VulkanPresentSettings,
        window_extent: vk::Extent2D,
        old_swapchain: vk::SwapchainKHR,
    ) -> GfxResult<Self> {
        let capabilities = unsafe {
            device.surface_pf.get_physical_device_surface_capabilities(device.physical_device, surface)?
        };
        let surface_format = Self::choose_surface_format(device, surface, settings.surface_format)?;
        let present_mode = Self::choose_present_mode(device, surface, settings.present_mode)?;
        let extent = Self::calculate_swapchain_extent(&capabilities, window_extent);

        // 确定 image count
        // max_image_count == 0，表示不限制 image 数量
        let image_count = if capabilities.max_image_count == 0 {
            capabilities.min_image_count + 1
        } else {
            u32::min(capabilities.max_image_count, capabilities.min_image_count + 1)
        };

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .clipped(true)
            .old_swapchain(old_swapchain);

        let handle = unsafe { device.swapchain_pf.create_swapchain(&create_info, None)? };
        let images = unsafe { device.swapchain_pf.get_swapchain_images(handle)? };
        let render_finished = images
            .iter()
            .map(|_| unsafe { device.device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None) })
            .collect::<Result<Vec<_>, _>>()?;

        log::info!(
            "swapchain created: {}x{}, {} images, {:?}",
            extent.width,
            extent.height,
            images.len(),
            present_mode
        );

        Ok(Self {
            handle,
            images,
            render_finished,
            format: surface_format.format,
            extent,
        })
    }

    fn choose_surface_format(
        device: &VulkanDevice,
        surface: vk::SurfaceKHR,
        preferred: vk::SurfaceFormatKHR,
    ) -> GfxResult<vk::SurfaceFormatKHR> {
        let formats = unsafe { device.surface_pf.get_physical_device_surface_formats(device.physical_device, surface)? };
        let chosen = formats
            .iter()
            .find(|f| f.format == preferred.format && f.color_space == preferred.color_space)
            .or(formats.first())
            .copied()
            .unwrap_or(preferred);
        if chosen.format != preferred.format {
            log::warn!("surface format {:?} is not supported, use {:?}", preferred.format, chosen.format);
        }
        Ok(chosen)
    }

    fn choose_present_mode(
        device: &VulkanDevice,
        surface: vk::SurfaceKHR,
        preferred: vk::PresentModeKHR,
    ) -> GfxResult<vk::PresentModeKHR> {
        let modes =
            unsafe { device.surface_pf.get_physical_device_surface_present_modes(device.physical_device, surface)? };
        // FIFO 总是被支持
        Ok(if modes.contains(&preferred) { preferred } else { vk::PresentModeKHR::FIFO })
    }

    /// surface 的 current_extent 为 u32::MAX 时，由窗口的尺寸决定
    fn calculate_swapchain_extent(capabilities: &vk::SurfaceCapabilitiesKHR, window_extent: vk::Extent2D) -> vk::Extent2D {
        if capabilities.current_extent.width != u32::MAX {
            return capabilities.current_extent;
        }
        vk::Extent2D {
            width: window_extent
                .width
                .clamp(capabilities.min_image_extent.width, capabilities.max_image_extent.width),
            height: window_extent
                .height
                .clamp(capabilities.min_image_extent.height, capabilities.max_image_extent.height),
        }
    }

    pub fn destroy(self, device: &VulkanDevice) {
        unsafe {
            for semaphore in self.render_finished {
                device.device.destroy_semaphore(semaphore, None);
            }
            device.swapchain_pf.destroy_swapchain(self.handle, None);
        }
    }
}

// getters
impl VulkanSwapchain {
    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.handle
    }

    #[inline]
    pub fn render_finished(&self, image_index: u32) -> vk::Semaphore {
        self.render_finished[image_index as usize]
    }

    #[inline]
    pub fn info(&self) -> GfxSwapchainInfo {
        GfxSwapchainInfo {
            extent: self.extent,
            format: self.format,
            images: self.images.clone(),
        }
    }
}

// tools
impl VulkanSwapchain {
    /// 没有超时
    pub fn acquire_next_image(&self, device: &VulkanDevice, semaphore: vk::Semaphore) -> GfxResult<GfxAcquire> {
        let result =
            unsafe { device.swapchain_pf.acquire_next_image(self.handle, u64::MAX, semaphore, vk::Fence::null()) };
        match result {
            Ok((index, suboptimal)) => {
                if suboptimal {
                    log::warn!("swapchain acquire image index {} is not optimal", index);
                }
                Ok(GfxAcquire::Image { index, suboptimal })
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(GfxAcquire::OutOfDate),
            Err(e) => Err(e.into()),
        }
    }

    pub fn present_image(&self, device: &VulkanDevice, image_index: u32) -> GfxResult<GfxPresent> {
        let wait_semaphores = [self.render_finished(image_index)];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .image_indices(&image_indices)
            .swapchains(std::slice::from_ref(&self.handle));

        match unsafe { device.swapchain_pf.queue_present(device.queue, &present_info) } {
            Ok(false) => Ok(GfxPresent::Presented),
            Ok(true) => Ok(GfxPresent::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(GfxPresent::OutOfDate),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capabilities(current: vk::Extent2D) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: current,
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            ..Default::default()
        }
    }

    #[test]
    fn surface_extent_wins_when_fixed() {
        let caps = capabilities(vk::Extent2D {
            width: 800,
            height: 600,
        });
        let extent = VulkanSwapchain::calculate_swapchain_extent(&caps, vk::Extent2D {
            width: 1024,
            height: 768,
        });
        assert_eq!(extent, vk::Extent2D {
            width: 800,
            height: 600
        });
    }

    #[test]
    fn window_extent_is_clamped_when_surface_is_flexible() {
        let caps = capabilities(vk::Extent2D {
            width: u32::MAX,
            height: u32::MAX,
        });
        let extent = VulkanSwapchain::calculate_swapchain_extent(&caps, vk::Extent2D {
            width: 8000,
            height: 0,
        });
        assert_eq!(extent, vk::Extent2D {
            width: 4096,
            height: 1
        });
    }
}
