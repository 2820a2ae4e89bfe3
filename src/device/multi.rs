//! Logical device grouping several physical devices.

use std::sync::Arc;

use super::{Device, DeviceInfo, DeviceQueue, DeviceType, KernelFeatures};
use crate::render::RenderBuffers;
use crate::util::{Error, Result};

/// Fans a render out to all of its sub-devices.
///
/// Queues are created on the sub-devices, never on the group itself.
pub struct MultiDevice {
    info: DeviceInfo,
    devices: Vec<Box<dyn Device>>,
}

impl MultiDevice {
    pub fn new(devices: Vec<Box<dyn Device>>) -> Self {
        let description = devices
            .iter()
            .map(|d| d.info().description.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let id = devices
            .iter()
            .map(|d| d.info().id.as_str())
            .collect::<Vec<_>>()
            .join("+");

        Self {
            info: DeviceInfo::new(DeviceType::Multi, format!("MULTI[{id}]"), format!("Multi: {description}")),
            devices,
        }
    }

    /// Direct sub-devices.
    pub fn devices(&self) -> &[Box<dyn Device>] {
        &self.devices
    }
}

impl Device for MultiDevice {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn foreach_device(&self, f: &mut dyn FnMut(&dyn Device)) {
        for device in &self.devices {
            device.foreach_device(f);
        }
    }

    fn concurrent_integrator_queues_num(&self) -> usize {
        self.devices.iter().map(|d| d.concurrent_integrator_queues_num()).sum()
    }

    fn max_num_path_states(&self) -> usize {
        self.devices
            .iter()
            .map(|d| d.max_num_path_states())
            .min()
            .unwrap_or(0)
    }

    fn queue_create_integrator(
        &self,
        _buffers: Arc<RenderBuffers>,
        _features: &KernelFeatures,
    ) -> Result<Box<dyn DeviceQueue>> {
        Err(Error::QueueCreation {
            device: self.info.description.clone(),
            reason: "integrator queues are created on sub-devices".into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::CpuDevice;
    use crate::render::{Scene, SceneParams};

    fn cpu(threads: usize) -> Box<dyn Device> {
        let scene = Arc::new(Scene::new(SceneParams::default()));
        Box::new(CpuDevice::new(scene, threads))
    }

    #[test]
    fn test_foreach_flattens_nested() {
        let inner: Box<dyn Device> = Box::new(MultiDevice::new(vec![cpu(1), cpu(2)]));
        let outer = MultiDevice::new(vec![inner, cpu(3)]);

        let mut queues = Vec::new();
        outer.foreach_device(&mut |device: &dyn Device| {
            assert_eq!(device.info().device_type, DeviceType::Cpu);
            queues.push(device.concurrent_integrator_queues_num());
        });

        assert_eq!(queues, vec![1, 2, 3]);
        assert_eq!(outer.devices().len(), 2);
        assert_eq!(outer.concurrent_integrator_queues_num(), 6);
    }

    #[test]
    fn test_group_does_not_create_queues() {
        let multi = MultiDevice::new(vec![cpu(1)]);
        let buffers = Arc::new(RenderBuffers::empty());
        let result = multi.queue_create_integrator(buffers, &KernelFeatures::default());
        assert!(matches!(result, Err(Error::QueueCreation { .. })));
    }
}
