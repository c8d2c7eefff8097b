//! Scene and timeline commands served by the reference host.

use std::time::Duration;

use serde_json::{Value, json};
use strum::VariantNames;
use tracing::info;

use hostlink::validation::predicates::{in_range, one_of, positive_frame};
use hostlink::{
    CommandHandler, CommandRouter, ErrorCode, FieldRule, HandlerError, HandlerResult, Params,
    Schema, ValidationError, ValueKind,
};

use crate::HOST_TARGET;
use crate::scene::{ObjectKind, Scene, SceneError, SceneObject};

/// How long a scene summary stays cached.
pub const SCENE_INFO_TTL: Duration = Duration::from_secs(5);

/// Highest frame number the timeline accepts.
pub const MAX_FRAME: u32 = 1_048_574;

/// Objects listed in a scene summary; the count still covers all of them.
pub const MAX_LISTED_OBJECTS: usize = 20;

impl From<SceneError> for HandlerError {
    fn from(error: SceneError) -> Self {
        let code = match &error {
            SceneError::ObjectExists { .. } => ErrorCode::ObjectExists,
            SceneError::ObjectNotFound { .. } => ErrorCode::ObjectNotFound,
            SceneError::InvalidFrameRange { .. } => ErrorCode::InvalidFrame,
        };
        Self::new(code, error.to_string())
    }
}

fn required_str<'a>(params: &'a Params, key: &str) -> Result<&'a str, HandlerError> {
    params
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| HandlerError::invalid_parameter(format!("{key} must be string")))
}

fn required_i64(params: &Params, key: &str) -> Result<i64, HandlerError> {
    params
        .get(key)
        .and_then(Value::as_i64)
        .ok_or_else(|| HandlerError::invalid_parameter(format!("{key} must be integer")))
}

fn rounded(location: [f64; 3]) -> [f64; 3] {
    location.map(|axis| (axis * 100.0).round() / 100.0)
}

fn vector3(value: &Value) -> Result<(), ValidationError> {
    match value.as_array() {
        Some(items) if items.len() == 3 && items.iter().all(Value::is_number) => Ok(()),
        _ => Err(ValidationError::new("Location must be three numbers")),
    }
}

/// Summarises the scene, memoised for [`SCENE_INFO_TTL`].
pub struct GetSceneInfo;

impl CommandHandler<Scene> for GetSceneInfo {
    fn command_name(&self) -> &str {
        "get_scene_info"
    }

    fn execute(&self, _params: &Params, scene: &mut Scene) -> HandlerResult {
        let key = scene.summary_cache_key();
        if let Some(cached) = scene.cache_mut().get(&key) {
            return Ok(cached.clone().into());
        }

        let objects: Vec<Value> = scene
            .objects()
            .iter()
            .take(MAX_LISTED_OBJECTS)
            .map(|object| {
                json!({
                    "name": object.name,
                    "type": object.kind,
                    "location": rounded(object.location),
                    "visible": object.visible,
                })
            })
            .collect();
        let listed = objects.len();
        let (frame_start, frame_end) = scene.frame_range();
        let summary = json!({
            "name": scene.name(),
            "object_count": scene.objects().len(),
            "objects": objects,
            "frame_current": scene.frame_current(),
            "frame_start": frame_start,
            "frame_end": frame_end,
            "fps": scene.fps(),
        });
        info!(target: HOST_TARGET, listed, "scene info collected");
        scene
            .cache_mut()
            .insert(key, summary.clone(), Some(SCENE_INFO_TTL));
        Ok(summary.into())
    }
}

/// Reports one object's type, location and visibility.
pub struct GetObjectInfo;

impl CommandHandler<Scene> for GetObjectInfo {
    fn command_name(&self) -> &str {
        "get_object_info"
    }

    fn parameter_schema(&self) -> Schema {
        Schema::new().field("name", FieldRule::required(ValueKind::String))
    }

    fn execute(&self, params: &Params, scene: &mut Scene) -> HandlerResult {
        let name = required_str(params, "name")?;
        let object = scene.object(name).ok_or_else(|| SceneError::ObjectNotFound {
            name: name.to_owned(),
        })?;
        Ok(json!(object).into())
    }
}

/// Adds a named object of a given kind, optionally placed at `location`.
pub struct CreateObject;

impl CommandHandler<Scene> for CreateObject {
    fn command_name(&self) -> &str {
        "create_object"
    }

    fn parameter_schema(&self) -> Schema {
        Schema::new()
            .field("name", FieldRule::required(ValueKind::String))
            .field(
                "kind",
                FieldRule::required(ValueKind::String)
                    .with_validator(one_of(ObjectKind::VARIANTS.iter().copied())),
            )
            .field(
                "location",
                FieldRule::optional(ValueKind::Array).with_validator(vector3),
            )
    }

    fn execute(&self, params: &Params, scene: &mut Scene) -> HandlerResult {
        let name = required_str(params, "name")?;
        let kind: ObjectKind = required_str(params, "kind")?
            .parse()
            .map_err(|_| HandlerError::new(ErrorCode::InvalidObjectType, "Unknown object kind"))?;
        let location = params
            .get("location")
            .and_then(Value::as_array)
            .map(|items| {
                let mut location = [0.0; 3];
                for (axis, item) in location.iter_mut().zip(items) {
                    *axis = item.as_f64().unwrap_or_default();
                }
                location
            })
            .unwrap_or_default();

        let object = SceneObject::new(name, kind).at(location);
        scene.add_object(object.clone())?;
        info!(target: HOST_TARGET, name, %kind, "object created");
        Ok(json!(object).into())
    }
}

/// Removes a named object.
pub struct DeleteObject;

impl CommandHandler<Scene> for DeleteObject {
    fn command_name(&self) -> &str {
        "delete_object"
    }

    fn parameter_schema(&self) -> Schema {
        Schema::new().field("name", FieldRule::required(ValueKind::String))
    }

    fn execute(&self, params: &Params, scene: &mut Scene) -> HandlerResult {
        let removed = scene.remove_object(required_str(params, "name")?)?;
        info!(target: HOST_TARGET, name = %removed.name, "object deleted");
        Ok(json!({"deleted": removed.name}).into())
    }
}

/// Moves the playhead to `frame`.
pub struct SetCurrentFrame;

impl CommandHandler<Scene> for SetCurrentFrame {
    fn command_name(&self) -> &str {
        "set_current_frame"
    }

    fn parameter_schema(&self) -> Schema {
        Schema::new().field(
            "frame",
            FieldRule::required(ValueKind::Integer).with_validator(positive_frame),
        )
    }

    fn execute(&self, params: &Params, scene: &mut Scene) -> HandlerResult {
        let frame = required_i64(params, "frame")?;
        scene.set_frame(frame);
        Ok(json!({"frame": frame}).into())
    }
}

/// Reports the frame range, current frame and fps.
pub struct GetTimelineInfo;

impl CommandHandler<Scene> for GetTimelineInfo {
    fn command_name(&self) -> &str {
        "get_timeline_info"
    }

    fn execute(&self, _params: &Params, scene: &mut Scene) -> HandlerResult {
        let (frame_start, frame_end) = scene.frame_range();
        Ok(json!({
            "current_frame": scene.frame_current(),
            "frame_start": frame_start,
            "frame_end": frame_end,
            "fps": scene.fps(),
        })
        .into())
    }
}

/// Replaces the timeline's start and end frames.
pub struct SetFrameRange;

impl CommandHandler<Scene> for SetFrameRange {
    fn command_name(&self) -> &str {
        "set_frame_range"
    }

    fn parameter_schema(&self) -> Schema {
        let frame = || {
            FieldRule::required(ValueKind::Integer)
                .with_validator(in_range(0.0, f64::from(MAX_FRAME)))
        };
        Schema::new()
            .field("frame_start", frame())
            .field("frame_end", frame())
    }

    fn execute(&self, params: &Params, scene: &mut Scene) -> HandlerResult {
        let start = required_i64(params, "frame_start")?;
        let end = required_i64(params, "frame_end")?;
        scene.set_frame_range(start, end)?;
        Ok(json!({"frame_start": start, "frame_end": end}).into())
    }
}

/// Lists every command the router was built with.
pub struct ListCommands {
    names: Vec<String>,
}

impl CommandHandler<Scene> for ListCommands {
    fn command_name(&self) -> &str {
        "list_commands"
    }

    fn describe(&self) -> String {
        "Lists registered commands".to_owned()
    }

    fn execute(&self, _params: &Params, _scene: &mut Scene) -> HandlerResult {
        Ok(json!({"commands": self.names, "count": self.names.len()}).into())
    }
}

/// Builds the reference host's router.
#[must_use]
pub fn scene_router() -> CommandRouter<Scene> {
    let mut router = CommandRouter::new();
    router.register_handler(GetSceneInfo);
    router.register_handler(GetObjectInfo);
    router.register_handler(CreateObject);
    router.register_handler(DeleteObject);
    router.register_handler(SetCurrentFrame);
    router.register_handler(GetTimelineInfo);
    router.register_handler(SetFrameRange);

    let mut names = router.get_registered_commands();
    names.push("list_commands".to_owned());
    names.sort();
    router.register_handler_factory("list_commands", move || {
        Box::new(ListCommands {
            names: names.clone(),
        })
    });
    router
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};
    use serde_json::json;

    use super::*;

    #[fixture]
    fn router() -> CommandRouter<Scene> {
        scene_router()
    }

    fn route(router: &CommandRouter<Scene>, scene: &mut Scene, request: Value) -> Value {
        let envelope = router.route_command(&request, scene);
        serde_json::to_value(envelope).expect("envelope serialises")
    }

    #[rstest]
    fn scene_info_lists_startup_objects(router: CommandRouter<Scene>) {
        let mut scene = Scene::default();
        let response = route(&router, &mut scene, json!({"type": "get_scene_info"}));
        assert_eq!(response["status"], "success");
        assert_eq!(response["result"]["object_count"], 3);
        assert_eq!(response["result"]["objects"][0]["type"], "CAMERA");
        assert_eq!(response["result"]["objects"][0]["location"], json!([7.36, -6.93, 4.96]));
    }

    #[rstest]
    fn scene_info_caps_listed_objects(router: CommandRouter<Scene>) {
        let mut scene = Scene::default();
        for index in 0..30 {
            scene
                .add_object(SceneObject::new(format!("Empty.{index:03}"), ObjectKind::Empty))
                .expect("add object");
        }
        let response = route(&router, &mut scene, json!({"type": "get_scene_info"}));
        assert_eq!(response["result"]["object_count"], 33);
        assert_eq!(
            response["result"]["objects"].as_array().map(Vec::len),
            Some(MAX_LISTED_OBJECTS)
        );
    }

    #[rstest]
    fn scene_info_is_cached_until_mutation(router: CommandRouter<Scene>) {
        let mut scene = Scene::default();
        route(&router, &mut scene, json!({"type": "get_scene_info"}));
        assert_eq!(scene.cache_mut().len(), 1);

        let created = route(
            &router,
            &mut scene,
            json!({"type": "create_object", "params": {"name": "Rig", "kind": "ARMATURE"}}),
        );
        assert_eq!(created["status"], "success");
        assert!(scene.cache_mut().is_empty());

        let response = route(&router, &mut scene, json!({"type": "get_scene_info"}));
        assert_eq!(response["result"]["object_count"], 4);
    }

    #[rstest]
    fn create_object_validates_kind(router: CommandRouter<Scene>) {
        let mut scene = Scene::default();
        let response = route(
            &router,
            &mut scene,
            json!({"type": "create_object", "params": {"name": "Blob", "kind": "BLOB"}}),
        );
        assert_eq!(response["error"]["code"], "INVALID_PARAMETER");
        assert_eq!(
            response["error"]["details"]["errors"][0],
            "kind: Value must be one of: MESH, EMPTY, CAMERA, LIGHT, ARMATURE"
        );
    }

    #[rstest]
    fn create_object_places_it(router: CommandRouter<Scene>) {
        let mut scene = Scene::default();
        let response = route(
            &router,
            &mut scene,
            json!({"type": "create_object", "params": {
                "name": "Target", "kind": "EMPTY", "location": [1, 2.5, -3]
            }}),
        );
        assert_eq!(response["result"]["location"], json!([1.0, 2.5, -3.0]));
        assert_eq!(response["context"]["active_object"], "Target");
    }

    #[rstest]
    fn duplicate_object_reports_exists(router: CommandRouter<Scene>) {
        let mut scene = Scene::default();
        let response = route(
            &router,
            &mut scene,
            json!({"type": "create_object", "params": {"name": "Cube", "kind": "MESH"}}),
        );
        assert_eq!(response["error"]["code"], "OBJECT_EXISTS");
    }

    #[rstest]
    #[case::object_info("get_object_info")]
    #[case::delete("delete_object")]
    fn missing_object_is_not_found(router: CommandRouter<Scene>, #[case] command: &str) {
        let mut scene = Scene::default();
        let response = route(
            &router,
            &mut scene,
            json!({"type": command, "params": {"name": "Suzanne"}}),
        );
        assert_eq!(response["error"]["code"], "OBJECT_NOT_FOUND");
        assert_eq!(response["error"]["message"], "Object not found: Suzanne");
        assert_eq!(response["suggestions"][0], "Check that the object name is correct");
    }

    #[rstest]
    #[case::reversed(json!({"frame_start": 100, "frame_end": 10}), "INVALID_FRAME")]
    #[case::not_integers(json!({"frame_start": "1", "frame_end": 10}), "INVALID_PARAMETER")]
    fn frame_range_failures(
        router: CommandRouter<Scene>,
        #[case] params: Value,
        #[case] code: &str,
    ) {
        let mut scene = Scene::default();
        let response = route(
            &router,
            &mut scene,
            json!({"type": "set_frame_range", "params": params}),
        );
        assert_eq!(response["error"]["code"], code);
        assert_eq!(scene.frame_range(), (1, 250));
    }

    #[rstest]
    fn timeline_reflects_frame_changes(router: CommandRouter<Scene>) {
        let mut scene = Scene::default();
        route(
            &router,
            &mut scene,
            json!({"type": "set_current_frame", "params": {"frame": 96}}),
        );
        let response = route(&router, &mut scene, json!({"type": "get_timeline_info"}));
        assert_eq!(response["result"]["current_frame"], 96);
        assert_eq!(response["result"]["fps"], 24);
    }

    #[rstest]
    fn list_commands_includes_itself(router: CommandRouter<Scene>) {
        let mut scene = Scene::default();
        let response = route(&router, &mut scene, json!({"type": "list_commands"}));
        let commands = response["result"]["commands"].clone();
        assert_eq!(response["result"]["count"], 8);
        assert!(commands.as_array().is_some_and(|names| names.contains(&json!("list_commands"))));
        assert_eq!(commands[0], "create_object");
    }
}
