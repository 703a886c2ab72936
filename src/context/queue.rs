///A device queue together with the family it was created from. The family index is
/// needed whenever command pools or sharing modes refer back to the queue.
#[derive(Clone, Debug)]
pub struct Queue {
    pub inner: ash::vk::Queue,
    pub family_index: u32,
    pub properties: ash::vk::QueueFamilyProperties,
}

impl Queue {
    ///True if this queue's family exposes all of `flags`.
    pub fn supports(&self, flags: ash::vk::QueueFlags) -> bool {
        self.properties.queue_flags.contains(flags)
    }
}

///Collects the per-family creation parameters before the device exists. One builder
/// per queue family; the number of priorities decides how many queues of that family
/// are created.
pub struct QueueBuilder {
    pub family_index: u32,
    pub properties: ash::vk::QueueFamilyProperties,
    ///One entry per queue to create, each the hardware scheduling priority of that
    /// queue. See the Vulkan documentation of `VkDeviceQueueCreateInfo` for the exact
    /// semantics.
    pub priorities: Vec<f32>,
}

impl QueueBuilder {
    ///Sets how many queues are created (the vector length) and their priorities.
    /// Entries beyond the family's `queue_count` are cut off.
    pub fn with_queues(&mut self, mut queue_priorities: Vec<f32>) {
        let max = self.properties.queue_count as usize;
        if queue_priorities.len() > max {
            queue_priorities.truncate(max);
        }

        self.priorities = queue_priorities;
    }

    pub fn as_create_info(&self) -> ash::vk::DeviceQueueCreateInfoBuilder<'_> {
        ash::vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(self.family_index)
            .queue_priorities(&self.priorities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family_with_count(queue_count: u32) -> ash::vk::QueueFamilyProperties {
        ash::vk::QueueFamilyProperties {
            queue_count,
            ..Default::default()
        }
    }

    #[test]
    fn priorities_are_capped_to_family_size() {
        let mut builder = QueueBuilder {
            family_index: 0,
            properties: family_with_count(2),
            priorities: vec![1.0],
        };
        builder.with_queues(vec![1.0, 0.5, 0.25]);
        assert_eq!(builder.priorities, vec![1.0, 0.5]);
    }

    #[test]
    fn create_info_carries_family_and_count() {
        let builder = QueueBuilder {
            family_index: 3,
            properties: family_with_count(4),
            priorities: vec![1.0, 0.5],
        };
        let info = builder.as_create_info();
        assert_eq!(info.queue_family_index, 3);
        assert_eq!(info.queue_count, 2);
    }
}
