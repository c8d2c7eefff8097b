//! The simulated scene the reference host owns on its main thread.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use strum::{Display, EnumString, VariantNames};
use thiserror::Error;

use hostlink::{ContextError, ContextProvider};

use crate::cache::TtlCache;

/// Kinds of object the scene can hold.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    VariantNames,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ObjectKind {
    /// Polygon geometry.
    Mesh,
    /// A transform with no data.
    Empty,
    /// A viewpoint.
    Camera,
    /// A light source.
    Light,
    /// A bone hierarchy.
    Armature,
}

/// One object in the scene.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SceneObject {
    /// Unique object name.
    pub name: String,
    /// Object kind.
    #[serde(rename = "type")]
    pub kind: ObjectKind,
    /// World-space location.
    pub location: [f64; 3],
    /// Whether the object is shown.
    pub visible: bool,
}

impl SceneObject {
    /// A visible object at the origin.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: ObjectKind) -> Self {
        Self {
            name: name.into(),
            kind,
            location: [0.0; 3],
            visible: true,
        }
    }

    /// Moves the object.
    #[must_use]
    pub const fn at(mut self, location: [f64; 3]) -> Self {
        self.location = location;
        self
    }
}

/// Scene mutations the model refuses.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SceneError {
    /// An object with the name already exists.
    #[error("Object already exists: {name}")]
    ObjectExists {
        /// The clashing name.
        name: String,
    },
    /// No object has the name.
    #[error("Object not found: {name}")]
    ObjectNotFound {
        /// The missing name.
        name: String,
    },
    /// The start frame lies after the end frame.
    #[error("Invalid frame range: start {start} is after end {end}")]
    InvalidFrameRange {
        /// Requested start.
        start: i64,
        /// Requested end.
        end: i64,
    },
}

/// Key prefix for cached scene summaries.
pub const SCENE_INFO_CACHE_PREFIX: &str = "scene_info_";

/// Scene state plus a query cache that every mutation invalidates.
#[derive(Debug)]
pub struct Scene {
    name: String,
    objects: Vec<SceneObject>,
    active_object: Option<String>,
    frame_current: i64,
    frame_start: i64,
    frame_end: i64,
    fps: u32,
    cache: TtlCache<Value>,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new("Scene")
    }
}

impl Scene {
    /// The default startup scene: a camera, a cube, and a light.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            objects: vec![
                SceneObject::new("Camera", ObjectKind::Camera).at([7.36, -6.93, 4.96]),
                SceneObject::new("Cube", ObjectKind::Mesh),
                SceneObject::new("Light", ObjectKind::Light).at([4.08, 1.0, 5.9]),
            ],
            active_object: Some("Cube".to_owned()),
            frame_current: 1,
            frame_start: 1,
            frame_end: 250,
            fps: 24,
            cache: TtlCache::default(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Objects in creation order.
    #[must_use]
    pub fn objects(&self) -> &[SceneObject] {
        &self.objects
    }

    #[must_use]
    pub fn object(&self, name: &str) -> Option<&SceneObject> {
        self.objects.iter().find(|object| object.name == name)
    }

    #[must_use]
    pub fn active_object(&self) -> Option<&str> {
        self.active_object.as_deref()
    }

    #[must_use]
    pub const fn frame_current(&self) -> i64 {
        self.frame_current
    }

    /// `(start, end)`, inclusive.
    #[must_use]
    pub const fn frame_range(&self) -> (i64, i64) {
        (self.frame_start, self.frame_end)
    }

    #[must_use]
    pub const fn fps(&self) -> u32 {
        self.fps
    }

    /// Adds `object` and makes it active.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::ObjectExists`] when the name is taken.
    pub fn add_object(&mut self, object: SceneObject) -> Result<(), SceneError> {
        if self.object(&object.name).is_some() {
            return Err(SceneError::ObjectExists { name: object.name });
        }
        self.active_object = Some(object.name.clone());
        self.objects.push(object);
        self.invalidate_cache();
        Ok(())
    }

    /// Removes and returns the named object.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::ObjectNotFound`] when nothing has the name.
    pub fn remove_object(&mut self, name: &str) -> Result<SceneObject, SceneError> {
        let index = self
            .objects
            .iter()
            .position(|object| object.name == name)
            .ok_or_else(|| SceneError::ObjectNotFound {
                name: name.to_owned(),
            })?;
        let removed = self.objects.remove(index);
        if self.active_object.as_deref() == Some(name) {
            self.active_object = None;
        }
        self.invalidate_cache();
        Ok(removed)
    }

    pub fn set_frame(&mut self, frame: i64) {
        self.frame_current = frame;
        self.invalidate_cache();
    }

    /// Sets the playback range.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::InvalidFrameRange`] when `start > end`.
    pub fn set_frame_range(&mut self, start: i64, end: i64) -> Result<(), SceneError> {
        if start > end {
            return Err(SceneError::InvalidFrameRange { start, end });
        }
        self.frame_start = start;
        self.frame_end = end;
        self.invalidate_cache();
        Ok(())
    }

    /// The summary cache.
    pub fn cache_mut(&mut self) -> &mut TtlCache<Value> {
        &mut self.cache
    }

    /// Cache key for this scene's summary.
    #[must_use]
    pub fn summary_cache_key(&self) -> String {
        format!("{SCENE_INFO_CACHE_PREFIX}{}", self.name)
    }

    fn invalidate_cache(&mut self) {
        self.cache.invalidate(Some(SCENE_INFO_CACHE_PREFIX));
    }
}

impl ContextProvider for Scene {
    fn context_snapshot(&self) -> Result<Map<String, Value>, ContextError> {
        let mut context = Map::new();
        context.insert("scene".to_owned(), json!(self.name));
        context.insert("active_object".to_owned(), json!(self.active_object));
        context.insert("frame_current".to_owned(), json!(self.frame_current));
        Ok(context)
    }
}
