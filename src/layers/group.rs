use tracing::debug;

use super::{Layer, LayerOptions};

/// Identifier for a logical layer inside a [`LayerGroup`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LogicalLayerId(u64);

struct LogicalLayer {
    id: LogicalLayerId,
    index: i32,
    visible: bool,
}

/// Several logical layers sharing one physical surface.
///
/// Only the group's base layer allocates pixels; children are ordering and
/// visibility metadata. The group is cleared and resized as one unit, and
/// drawing happens through [`LayerGroup::base_mut`] in the order produced by
/// [`LayerGroup::ordered_visible`].
pub struct LayerGroup {
    base: Layer,
    children: Vec<LogicalLayer>,
    next_id: u64,
}

impl LayerGroup {
    pub fn new(name: impl Into<String>, options: LayerOptions) -> Self {
        Self {
            base: Layer::new(name, options),
            children: Vec::new(),
            next_id: 1,
        }
    }

    /// The layer owning the shared surface.
    pub fn base(&self) -> &Layer {
        &self.base
    }

    pub fn base_mut(&mut self) -> &mut Layer {
        &mut self.base
    }

    /// Add a logical child at `index`; no surface is allocated.
    pub fn add_layer(&mut self, index: i32) -> LogicalLayerId {
        let id = LogicalLayerId(self.next_id);
        self.next_id += 1;
        self.children.push(LogicalLayer {
            id,
            index,
            visible: true,
        });
        debug!("layer group {:?}: added logical layer {id:?}", self.base.name());
        id
    }

    /// Remove a logical child. Unknown ids are ignored.
    pub fn remove_layer(&mut self, id: LogicalLayerId) {
        self.children.retain(|child| child.id != id);
    }

    pub fn contains(&self, id: LogicalLayerId) -> bool {
        self.children.iter().any(|child| child.id == id)
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn set_layer_visibility(&mut self, id: LogicalLayerId, visible: bool) {
        if let Some(child) = self.children.iter_mut().find(|child| child.id == id) {
            child.visible = visible;
        }
    }

    pub fn is_layer_visible(&self, id: LogicalLayerId) -> bool {
        self.children
            .iter()
            .find(|child| child.id == id)
            .map(|child| child.visible)
            .unwrap_or(false)
    }

    /// Move a child to the end of its z-band so it renders last ("bring to
    /// front" for user convenience).
    pub fn bring_to_front(&mut self, id: LogicalLayerId) {
        let Some(position) = self.children.iter().position(|child| child.id == id) else {
            return;
        };
        let max_index = self
            .children
            .iter()
            .map(|child| child.index)
            .max()
            .unwrap_or(0);
        let child = self.children.remove(position);
        self.children.push(LogicalLayer {
            index: max_index,
            ..child
        });
    }

    /// Visible children sorted ascending by z-index, stable within a band.
    pub fn ordered_visible(&self) -> Vec<LogicalLayerId> {
        let mut ordered: Vec<(i32, usize, LogicalLayerId)> = self
            .children
            .iter()
            .enumerate()
            .filter(|(_, child)| child.visible)
            .map(|(position, child)| (child.index, position, child.id))
            .collect();
        ordered.sort_by_key(|(index, position, _)| (*index, *position));
        ordered.into_iter().map(|(_, _, id)| id).collect()
    }

    /// Resize the shared surface; children keep their metadata.
    pub fn resize(&mut self, logical_width: f32, logical_height: f32, pixel_ratio: f32) {
        self.base.resize(logical_width, logical_height, pixel_ratio);
    }

    /// Clear the shared surface for a fresh render pass.
    pub fn clear(&mut self) {
        self.base.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn children_share_one_surface() {
        let mut group = LayerGroup::new("regions", LayerOptions::default());
        group.resize(4.0, 4.0, 1.0);
        let a = group.add_layer(0);
        let b = group.add_layer(1);
        assert!(group.contains(a));
        assert!(group.contains(b));
        // Only the base holds pixels.
        assert_eq!(group.base().width(), 4);
        assert_eq!(group.len(), 2);
    }

    #[test]
    fn ordered_visible_sorts_by_index_then_insertion() {
        let mut group = LayerGroup::new("regions", LayerOptions::default());
        let low = group.add_layer(0);
        let high = group.add_layer(5);
        let mid = group.add_layer(2);
        assert_eq!(group.ordered_visible(), vec![low, mid, high]);
    }

    #[test]
    fn bring_to_front_moves_child_last() {
        let mut group = LayerGroup::new("regions", LayerOptions::default());
        let first = group.add_layer(1);
        let second = group.add_layer(1);
        group.bring_to_front(first);
        assert_eq!(group.ordered_visible(), vec![second, first]);
    }

    #[test]
    fn hidden_children_are_skipped() {
        let mut group = LayerGroup::new("regions", LayerOptions::default());
        let shown = group.add_layer(0);
        let hidden = group.add_layer(1);
        group.set_layer_visibility(hidden, false);
        assert_eq!(group.ordered_visible(), vec![shown]);
        assert!(!group.is_layer_visible(hidden));
    }

    #[test]
    fn remove_layer_is_silent_for_unknown_ids() {
        let mut group = LayerGroup::new("regions", LayerOptions::default());
        let id = group.add_layer(0);
        group.remove_layer(id);
        group.remove_layer(id);
        assert!(group.is_empty());
    }
}
