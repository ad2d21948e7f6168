//! Scene composition
//!
//! The [`Compositor`] ties a scene snapshot to a running [`Scheduler`]: it
//! owns the shared [`ColorCache`], builds one render task per layer entry,
//! and decides on reload whether the existing tasks can take the new
//! snapshot or the stack has to be rebuilt.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use super::color::ColorCache;
use super::pointer::PointerInput;
use super::scheduler::{ConfigUpdate, LayerState, Scheduler};
use super::surface::Viewport;
use crate::config::SceneConfig;
use crate::layers::build_task;
use crate::render::LayerOutput;

/// Outcome of handing a new scene snapshot to the compositor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneUpdate {
    /// Snapshot equal to the active one
    Unchanged,
    /// Live layers took the snapshot in place
    Updated { applied: usize, reseeded: usize },
    /// The layer stack was torn down and built again
    Rebuilt,
}

/// Owns the scene snapshot, the color cache and the layer scheduler
#[derive(Debug)]
pub struct Compositor {
    scene: Arc<SceneConfig>,
    colors: ColorCache,
    scheduler: Scheduler,
    pointer: PointerInput,
    /// Window size in logical pixels
    logical: (f32, f32),
    scale: f32,
}

impl Compositor {
    /// Build every layer of `scene` for a window of the given logical size
    pub fn new(scene: SceneConfig, logical: (f32, f32), scale: f32) -> Self {
        let viewport = Viewport::from_logical(logical.0, logical.1, scale, scene.max_pixel_ratio);
        let mut compositor = Self {
            scheduler: Scheduler::new(viewport, scene.max_frame_delta),
            scene: Arc::new(scene),
            colors: ColorCache::new(),
            pointer: PointerInput::CENTER,
            logical,
            scale,
        };
        compositor.build_layers();
        compositor
    }

    fn build_layers(&mut self) {
        for layer in &self.scene.layers {
            let task = build_task(layer, &self.colors);
            let kind = task.kind();
            if self.scheduler.push(task, &self.colors) == LayerState::Failed {
                warn!("{} layer failed to mount", kind);
            }
        }
        info!(
            "Built {} layers at {}x{}",
            self.scheduler.len(),
            self.scheduler.viewport().width,
            self.scheduler.viewport().height
        );
    }

    fn viewport(&self) -> Viewport {
        Viewport::from_logical(
            self.logical.0,
            self.logical.1,
            self.scale,
            self.scene.max_pixel_ratio,
        )
    }

    /// Replace the active scene snapshot
    ///
    /// Layers keep running when the new scene has the same layer kinds in
    /// the same order; any other change rebuilds the stack.
    pub fn apply_scene(&mut self, scene: SceneConfig) -> SceneUpdate {
        if *self.scene == scene {
            return SceneUpdate::Unchanged;
        }

        let in_place = self.scene.same_structure(&scene)
            && self.scene.max_frame_delta == scene.max_frame_delta
            && self.scene.max_pixel_ratio == scene.max_pixel_ratio;

        if in_place {
            let mut applied = 0;
            let mut reseeded = 0;
            let mut compatible = true;
            for (index, layer) in scene.layers.iter().enumerate() {
                match self.scheduler.apply_config(index, layer, &self.colors) {
                    ConfigUpdate::Unchanged => {}
                    ConfigUpdate::Applied => applied += 1,
                    ConfigUpdate::Reseeded => reseeded += 1,
                    ConfigUpdate::Incompatible => {
                        compatible = false;
                        break;
                    }
                }
            }
            if compatible {
                self.scene = Arc::new(scene);
                debug!("Scene updated in place ({} applied, {} reseeded)", applied, reseeded);
                return SceneUpdate::Updated { applied, reseeded };
            }
        }

        self.rebuild(scene);
        SceneUpdate::Rebuilt
    }

    fn rebuild(&mut self, scene: SceneConfig) {
        let visible = self.scheduler.is_visible();
        self.scheduler.clear();
        self.scene = Arc::new(scene);
        self.scheduler = Scheduler::new(self.viewport(), self.scene.max_frame_delta);
        self.scheduler.set_visible(visible);
        self.build_layers();
        info!("Scene rebuilt");
    }

    /// Advance every layer with a pending frame request
    pub fn tick(&mut self, now: Instant) -> usize {
        self.scheduler.tick(now, self.pointer)
    }

    /// Record the raw pointer position in logical pixels
    pub fn set_cursor(&mut self, x: f32, y: f32) {
        self.pointer = PointerInput::from_position(x, y, self.logical.0, self.logical.1);
    }

    #[cfg(test)]
    pub fn pointer(&self) -> PointerInput {
        self.pointer
    }

    /// Resize for a new logical window size
    pub fn resize(&mut self, width: f32, height: f32) {
        self.logical = (width, height);
        self.scheduler.resize(self.viewport(), &self.colors);
    }

    /// Track the display scale factor reported by the renderer
    pub fn set_scale(&mut self, scale: f32) {
        if !scale.is_finite() || scale <= 0.0 || scale == self.scale {
            return;
        }
        debug!("Scale factor changed to {}", scale);
        self.scale = scale;
        self.scheduler.resize(self.viewport(), &self.colors);
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.scheduler.set_visible(visible);
    }

    pub fn is_visible(&self) -> bool {
        self.scheduler.is_visible()
    }

    pub fn wants_frame(&self) -> bool {
        self.scheduler.wants_frame()
    }

    #[cfg(test)]
    pub fn device_viewport(&self) -> Viewport {
        self.scheduler.viewport()
    }

    pub fn layer_kinds(&self) -> Vec<&'static str> {
        self.scheduler.kinds()
    }

    #[cfg(test)]
    pub fn layer_states(&self) -> Vec<LayerState> {
        self.scheduler.states()
    }

    /// Outputs of live layers, bottom first
    pub fn outputs(&self) -> Vec<LayerOutput> {
        self.scheduler.outputs()
    }

    /// Tear every layer down. Safe to call more than once.
    pub fn shutdown(&mut self) {
        self.scheduler.teardown_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AuroraConfig, BlobConfig, GradientConfig, LayerConfig, WaveConfig};
    use std::time::Duration;

    fn small_scene() -> SceneConfig {
        SceneConfig {
            layers: vec![
                LayerConfig::Gradient(GradientConfig::default()),
                LayerConfig::Blob(BlobConfig {
                    blob_count: Some(3),
                    ..Default::default()
                }),
            ],
            ..Default::default()
        }
    }

    fn ids(compositor: &Compositor) -> Vec<u64> {
        compositor.outputs().iter().map(LayerOutput::layer_id).collect()
    }

    #[test]
    fn test_builds_layers_in_scene_order() {
        let compositor = Compositor::new(small_scene(), (64.0, 48.0), 1.0);
        assert_eq!(compositor.layer_kinds(), vec!["gradient", "blob"]);
        assert_eq!(
            compositor.layer_states(),
            vec![LayerState::Running, LayerState::Running]
        );
        assert_eq!(compositor.device_viewport(), Viewport::new(64, 48));
        assert!(compositor.wants_frame());
    }

    #[test]
    fn test_pixel_ratio_is_capped() {
        let scene = SceneConfig {
            max_pixel_ratio: 1.5,
            ..small_scene()
        };
        let compositor = Compositor::new(scene, (100.0, 40.0), 3.0);
        assert_eq!(compositor.device_viewport(), Viewport::new(150, 60));
    }

    #[test]
    fn test_equal_scene_is_unchanged() {
        let mut compositor = Compositor::new(small_scene(), (32.0, 32.0), 1.0);
        assert_eq!(compositor.apply_scene(small_scene()), SceneUpdate::Unchanged);
    }

    #[test]
    fn test_field_change_keeps_layers() {
        let mut compositor = Compositor::new(small_scene(), (32.0, 32.0), 1.0);
        let before = ids(&compositor);

        let mut scene = small_scene();
        if let LayerConfig::Gradient(g) = &mut scene.layers[0] {
            g.wave_intensity = 0.9;
        }
        if let LayerConfig::Blob(b) = &mut scene.layers[1] {
            b.blob_count = Some(5);
        }

        assert_eq!(
            compositor.apply_scene(scene),
            SceneUpdate::Updated {
                applied: 1,
                reseeded: 1
            }
        );
        assert_eq!(ids(&compositor), before);
    }

    #[test]
    fn test_structure_change_rebuilds() {
        let mut compositor = Compositor::new(small_scene(), (32.0, 32.0), 1.0);
        let before = ids(&compositor);

        let scene = SceneConfig {
            layers: vec![
                LayerConfig::Aurora(AuroraConfig {
                    line_count: Some(10),
                    ..Default::default()
                }),
                LayerConfig::Wave(WaveConfig::default()),
            ],
            ..Default::default()
        };

        assert_eq!(compositor.apply_scene(scene), SceneUpdate::Rebuilt);
        assert_eq!(compositor.layer_kinds(), vec!["aurora", "wave"]);
        assert!(ids(&compositor).iter().all(|id| !before.contains(id)));
    }

    #[test]
    fn test_rebuild_keeps_suspension() {
        let mut compositor = Compositor::new(small_scene(), (32.0, 32.0), 1.0);
        compositor.set_visible(false);

        compositor.apply_scene(SceneConfig {
            layers: vec![LayerConfig::Wave(WaveConfig::default())],
            ..Default::default()
        });

        assert!(!compositor.is_visible());
        assert_eq!(compositor.layer_states(), vec![LayerState::Suspended]);
        assert!(!compositor.wants_frame());
    }

    #[test]
    fn test_hidden_window_produces_no_frames() {
        let mut compositor = Compositor::new(small_scene(), (32.0, 32.0), 1.0);
        let start = Instant::now();
        assert_eq!(compositor.tick(start), 2);

        compositor.set_visible(false);
        assert_eq!(compositor.tick(start + Duration::from_millis(16)), 0);

        compositor.set_visible(true);
        assert!(compositor.wants_frame());
        assert_eq!(compositor.tick(start + Duration::from_secs(5)), 2);
    }

    #[test]
    fn test_resize_reaches_every_layer() {
        let mut compositor = Compositor::new(small_scene(), (40.0, 30.0), 2.0);
        compositor.resize(80.0, 20.0);
        assert_eq!(compositor.device_viewport(), Viewport::new(160, 40));

        for output in compositor.outputs() {
            let size = match output {
                LayerOutput::Gradient(g) => (
                    g.frame.resolution[0] as u32,
                    g.frame.resolution[1] as u32,
                ),
                LayerOutput::Surface(s) => s.source.size().unwrap(),
            };
            assert_eq!(size, (160, 40));
        }
    }

    #[test]
    fn test_scale_change_resizes() {
        let mut compositor = Compositor::new(small_scene(), (40.0, 30.0), 1.0);
        compositor.set_scale(2.0);
        assert_eq!(compositor.device_viewport(), Viewport::new(80, 60));

        compositor.set_scale(f32::NAN);
        assert_eq!(compositor.device_viewport(), Viewport::new(80, 60));
    }

    #[test]
    fn test_cursor_is_normalized_to_window() {
        let mut compositor = Compositor::new(small_scene(), (200.0, 100.0), 1.0);
        compositor.set_cursor(50.0, 100.0);
        assert_eq!(compositor.pointer(), PointerInput { x: 0.25, y: 1.0 });
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let mut compositor = Compositor::new(small_scene(), (16.0, 16.0), 1.0);
        compositor.shutdown();
        compositor.shutdown();
        assert!(
            compositor
                .layer_states()
                .iter()
                .all(|s| *s == LayerState::TornDown)
        );
        assert!(compositor.outputs().is_empty());
        assert!(!compositor.wants_frame());
    }
}
