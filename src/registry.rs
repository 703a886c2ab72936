//! ## Registry
//!
//! Name-keyed bookkeeping for created resources. Every entry owns its wrapper, so
//! removing an entry destroys the underlying Vulkan objects through the wrapper's
//! Drop. Keys are (kind, name), which lets a buffer and an image share a name.
//!
//! Teardown runs in a fixed dependency order so no resource outlives one it
//! references.

use std::sync::Arc;

use ahash::AHashMap;
use ash::vk;

use crate::{
    context::{Debugger, Device, Queue},
    error::ResourceError,
    resources::{
        AnyPipeline, Buffer, CommandBuffer, CommandPool, DescriptorPool, DescriptorSet,
        Framebuffer, Image, ImageView, RenderPass, Sampler, ShaderModule,
    },
    EasyVkError,
};

///The kinds of resources the registry tracks. Also the unit of the teardown order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Buffer,
    Image,
    Pipeline,
    DescriptorSet,
    CommandBuffer,
    Sampler,
    RenderPass,
    Framebuffer,
    ShaderModule,
}

///Destruction order: consumers before the resources they reference.
/// Descriptor pools and command pools are kept alive by their sets/buffers and
/// go down with them.
const TEARDOWN_ORDER: [ResourceKind; 9] = [
    ResourceKind::Framebuffer,
    ResourceKind::RenderPass,
    ResourceKind::Pipeline,
    ResourceKind::ShaderModule,
    ResourceKind::Sampler,
    ResourceKind::Image,
    ResourceKind::Buffer,
    ResourceKind::CommandBuffer,
    ResourceKind::DescriptorSet,
];

///The (kind, name) keyed storage underneath the registry, generic so the bookkeeping
/// can be exercised independently of live Vulkan objects.
struct EntryMap<E> {
    entries: AHashMap<(ResourceKind, String), E>,
}

impl<E> EntryMap<E> {
    fn new() -> Self {
        EntryMap {
            entries: AHashMap::default(),
        }
    }

    ///Inserts `entry`, returning the replaced entry when (kind, name) was taken.
    fn insert(&mut self, kind: ResourceKind, name: String, entry: E) -> Option<E> {
        self.entries.insert((kind, name), entry)
    }

    fn remove(&mut self, kind: ResourceKind, name: &str) -> Option<E> {
        self.entries.remove(&(kind, name.to_string()))
    }

    fn contains(&self, kind: ResourceKind, name: &str) -> bool {
        self.entries.contains_key(&(kind, name.to_string()))
    }

    fn get(&self, kind: ResourceKind, name: &str) -> Option<&E> {
        self.entries.get(&(kind, name.to_string()))
    }

    fn get_mut(&mut self, kind: ResourceKind, name: &str) -> Option<&mut E> {
        self.entries.get_mut(&(kind, name.to_string()))
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    ///Drops every entry of `kind`, calling `on_remove` with the entry's name first.
    fn remove_kind(&mut self, kind: ResourceKind, mut on_remove: impl FnMut(&str)) {
        self.entries.retain(|(entry_kind, name), _entry| {
            if *entry_kind == kind {
                on_remove(name);
                false
            } else {
                true
            }
        });
    }
}

///An image entry: the image, a default view, and the layout the registry believes
/// the image is currently in.
pub struct ImageRecord {
    pub image: Arc<Image>,
    pub view: ImageView,
    pub layout: vk::ImageLayout,
}

///One tracked resource. Each variant owns its wrapper, so dropping the entry
/// destroys the underlying handles.
pub enum ResourceEntry {
    Buffer(Buffer),
    Image(ImageRecord),
    Pipeline(AnyPipeline),
    DescriptorSet(DescriptorSet<Arc<DescriptorPool>>),
    CommandBuffer(CommandBuffer<Arc<CommandPool>>),
    Sampler(Sampler),
    RenderPass(Arc<RenderPass>),
    Framebuffer(Framebuffer),
    ShaderModule(ShaderModule),
}

impl ResourceEntry {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceEntry::Buffer(_) => ResourceKind::Buffer,
            ResourceEntry::Image(_) => ResourceKind::Image,
            ResourceEntry::Pipeline(_) => ResourceKind::Pipeline,
            ResourceEntry::DescriptorSet(_) => ResourceKind::DescriptorSet,
            ResourceEntry::CommandBuffer(_) => ResourceKind::CommandBuffer,
            ResourceEntry::Sampler(_) => ResourceKind::Sampler,
            ResourceEntry::RenderPass(_) => ResourceKind::RenderPass,
            ResourceEntry::Framebuffer(_) => ResourceKind::Framebuffer,
            ResourceEntry::ShaderModule(_) => ResourceKind::ShaderModule,
        }
    }
}

///Name-keyed registry of created resources on one device.
pub struct ResourceRegistry {
    pub device: Arc<Device>,
    ///When present, registered names are forwarded as debug-utils object names.
    pub debugger: Option<Arc<Debugger>>,
    entries: EntryMap<ResourceEntry>,
}

impl ResourceRegistry {
    pub fn new(device: &Arc<Device>, debugger: Option<Arc<Debugger>>) -> Self {
        ResourceRegistry {
            device: device.clone(),
            debugger,
            entries: EntryMap::new(),
        }
    }

    ///Registers `entry` under `name`. An existing entry of the same kind and name is
    /// replaced; the replaced wrapper is dropped, which destroys its Vulkan objects.
    pub fn register(&mut self, name: impl Into<String>, entry: ResourceEntry) {
        let name = name.into();
        self.name_object(&name, &entry);

        let kind = entry.kind();
        if let Some(_old) = self.entries.insert(kind, name.clone(), entry) {
            #[cfg(feature = "logging")]
            log::warn!(
                "Replacing {:?} \"{}\", the previous resource is destroyed",
                kind,
                name
            );
        }
    }

    ///Removes the entry under (kind, name). Returns true if it was present. Dropping
    /// the entry destroys the wrapped resources; dependents are not touched.
    pub fn clear(&mut self, name: &str, kind: ResourceKind) -> bool {
        self.entries.remove(kind, name).is_some()
    }

    pub fn contains(&self, name: &str, kind: ResourceKind) -> bool {
        self.entries.contains(kind, name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn buffer(&self, name: &str) -> Option<&Buffer> {
        match self.entries.get(ResourceKind::Buffer, name)? {
            ResourceEntry::Buffer(buffer) => Some(buffer),
            _ => None,
        }
    }

    pub fn image(&self, name: &str) -> Option<&ImageRecord> {
        match self.entries.get(ResourceKind::Image, name)? {
            ResourceEntry::Image(record) => Some(record),
            _ => None,
        }
    }

    ///Mutable access to an image record, mostly for layout tracking.
    pub fn image_mut(&mut self, name: &str) -> Option<&mut ImageRecord> {
        match self.entries.get_mut(ResourceKind::Image, name)? {
            ResourceEntry::Image(record) => Some(record),
            _ => None,
        }
    }

    pub fn pipeline(&self, name: &str) -> Option<&AnyPipeline> {
        match self.entries.get(ResourceKind::Pipeline, name)? {
            ResourceEntry::Pipeline(pipeline) => Some(pipeline),
            _ => None,
        }
    }

    pub fn descriptor_set(&self, name: &str) -> Option<&DescriptorSet<Arc<DescriptorPool>>> {
        match self.entries.get(ResourceKind::DescriptorSet, name)? {
            ResourceEntry::DescriptorSet(set) => Some(set),
            _ => None,
        }
    }

    pub fn command_buffer(&self, name: &str) -> Option<&CommandBuffer<Arc<CommandPool>>> {
        match self.entries.get(ResourceKind::CommandBuffer, name)? {
            ResourceEntry::CommandBuffer(buffer) => Some(buffer),
            _ => None,
        }
    }

    pub fn sampler(&self, name: &str) -> Option<&Sampler> {
        match self.entries.get(ResourceKind::Sampler, name)? {
            ResourceEntry::Sampler(sampler) => Some(sampler),
            _ => None,
        }
    }

    pub fn render_pass(&self, name: &str) -> Option<&Arc<RenderPass>> {
        match self.entries.get(ResourceKind::RenderPass, name)? {
            ResourceEntry::RenderPass(pass) => Some(pass),
            _ => None,
        }
    }

    pub fn framebuffer(&self, name: &str) -> Option<&Framebuffer> {
        match self.entries.get(ResourceKind::Framebuffer, name)? {
            ResourceEntry::Framebuffer(framebuffer) => Some(framebuffer),
            _ => None,
        }
    }

    pub fn shader_module(&self, name: &str) -> Option<&ShaderModule> {
        match self.entries.get(ResourceKind::ShaderModule, name)? {
            ResourceEntry::ShaderModule(module) => Some(module),
            _ => None,
        }
    }

    ///Transitions the tracked image `name` to `target_layout` with a blocking one-shot
    /// submission on `queue`, and updates the tracked layout in place.
    pub fn transition_image(
        &mut self,
        name: &str,
        queue: &Queue,
        target_layout: vk::ImageLayout,
    ) -> Result<(), EasyVkError> {
        let device = self.device.clone();
        let record = self.image_mut(name).ok_or_else(|| ResourceError::NotFound {
            kind: ResourceKind::Image,
            name: name.to_string(),
        })?;

        crate::commands::transition_image_layout(
            &device,
            queue,
            &record.image,
            &mut record.layout,
            target_layout,
        )
    }

    ///Destroys all tracked resources in dependency order. The registry stays usable
    /// afterwards.
    pub fn cleanup(&mut self) {
        for kind in TEARDOWN_ORDER {
            self.entries.remove_kind(kind, |_name| {
                #[cfg(feature = "logging")]
                log::debug!("Destroying {:?} \"{}\"", kind, _name);
            });
        }
    }

    fn name_object(&self, name: &str, entry: &ResourceEntry) {
        let Some(debugger) = &self.debugger else {
            return;
        };
        let Ok(cname) = std::ffi::CString::new(name) else {
            #[cfg(feature = "logging")]
            log::warn!("Resource name \"{}\" contains a nul byte, not naming", name);
            return;
        };

        let result = match entry {
            ResourceEntry::Buffer(buffer) => {
                debugger.name_object(&self.device.inner, buffer.inner, &cname)
            }
            ResourceEntry::Image(record) => debugger
                .name_object(&self.device.inner, record.image.inner, &cname)
                .and_then(|_| debugger.name_object(&self.device.inner, record.view.view, &cname)),
            ResourceEntry::Pipeline(pipeline) => {
                debugger.name_object(&self.device.inner, pipeline.raw(), &cname)
            }
            ResourceEntry::DescriptorSet(set) => {
                debugger.name_object(&self.device.inner, set.inner, &cname)
            }
            ResourceEntry::CommandBuffer(buffer) => {
                debugger.name_object(&self.device.inner, buffer.inner, &cname)
            }
            ResourceEntry::Sampler(sampler) => {
                debugger.name_object(&self.device.inner, sampler.inner, &cname)
            }
            ResourceEntry::RenderPass(pass) => {
                debugger.name_object(&self.device.inner, pass.inner, &cname)
            }
            ResourceEntry::Framebuffer(framebuffer) => {
                debugger.name_object(&self.device.inner, framebuffer.inner, &cname)
            }
            ResourceEntry::ShaderModule(module) => {
                debugger.name_object(&self.device.inner, module.module, &cname)
            }
        };

        if let Err(e) = result {
            #[cfg(feature = "logging")]
            log::warn!("Failed to name {:?} \"{}\": {}", entry.kind(), name, e);
            #[cfg(not(feature = "logging"))]
            let _ = e;
        }
    }
}

impl Drop for ResourceRegistry {
    fn drop(&mut self) {
        self.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(ResourceRegistry: Send, Sync);
    }

    #[test]
    fn teardown_order_covers_every_kind_once() {
        let all = [
            ResourceKind::Buffer,
            ResourceKind::Image,
            ResourceKind::Pipeline,
            ResourceKind::DescriptorSet,
            ResourceKind::CommandBuffer,
            ResourceKind::Sampler,
            ResourceKind::RenderPass,
            ResourceKind::Framebuffer,
            ResourceKind::ShaderModule,
        ];
        for kind in all {
            assert_eq!(
                TEARDOWN_ORDER.iter().filter(|k| **k == kind).count(),
                1,
                "{:?} must appear exactly once",
                kind
            );
        }
    }

    #[test]
    fn consumers_are_destroyed_before_their_dependencies() {
        let position = |kind: ResourceKind| {
            TEARDOWN_ORDER
                .iter()
                .position(|k| *k == kind)
                .unwrap_or(usize::MAX)
        };
        assert!(position(ResourceKind::Framebuffer) < position(ResourceKind::RenderPass));
        assert!(position(ResourceKind::RenderPass) < position(ResourceKind::Pipeline));
        assert!(position(ResourceKind::Pipeline) < position(ResourceKind::ShaderModule));
        assert!(position(ResourceKind::Sampler) < position(ResourceKind::Image));
        assert!(position(ResourceKind::Image) < position(ResourceKind::Buffer));
    }

    #[test]
    fn clear_succeeds_exactly_once() {
        let mut map = EntryMap::new();
        assert!(map
            .insert(ResourceKind::Buffer, "vertices".to_string(), 1u32)
            .is_none());

        assert!(map.contains(ResourceKind::Buffer, "vertices"));
        assert!(map.remove(ResourceKind::Buffer, "vertices").is_some());
        assert!(map.remove(ResourceKind::Buffer, "vertices").is_none());
        assert!(!map.contains(ResourceKind::Buffer, "vertices"));
    }

    #[test]
    fn same_name_under_two_kinds_coexists() {
        let mut map = EntryMap::new();
        map.insert(ResourceKind::Buffer, "noise".to_string(), 1u32);
        map.insert(ResourceKind::Image, "noise".to_string(), 2u32);

        assert_eq!(map.len(), 2);
        assert_eq!(map.get(ResourceKind::Buffer, "noise"), Some(&1));
        assert_eq!(map.get(ResourceKind::Image, "noise"), Some(&2));

        //removing one kind leaves the other untouched
        assert!(map.remove(ResourceKind::Buffer, "noise").is_some());
        assert!(map.contains(ResourceKind::Image, "noise"));
    }

    #[test]
    fn insert_hands_back_the_replaced_entry() {
        let mut map = EntryMap::new();
        map.insert(ResourceKind::Sampler, "linear".to_string(), 1u32);
        let old = map.insert(ResourceKind::Sampler, "linear".to_string(), 2u32);
        assert_eq!(old, Some(1));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn remove_kind_only_touches_that_kind() {
        let mut map = EntryMap::new();
        map.insert(ResourceKind::Framebuffer, "main".to_string(), 1u32);
        map.insert(ResourceKind::RenderPass, "main".to_string(), 2u32);
        map.insert(ResourceKind::Framebuffer, "shadow".to_string(), 3u32);

        let mut removed = Vec::new();
        map.remove_kind(ResourceKind::Framebuffer, |name| {
            removed.push(name.to_string())
        });

        removed.sort();
        assert_eq!(removed, vec!["main".to_string(), "shadow".to_string()]);
        assert_eq!(map.len(), 1);
        assert!(map.contains(ResourceKind::RenderPass, "main"));
    }
}
