//! Pure constructors for routing and broadcast envelopes
//!
//! Everything here is side-effect free; the router and scheduler build
//! their wire traffic through these forms.

use serde_json::Value;

use super::domain_types::{
    BroadcastEnvelope, Direction, Fields, MethodArgs, MethodCall, MethodName, ResponseId,
    RoutePath, RoutedEnvelope,
};

/// Instance fields that only make sense inside the owning cell and
/// must not overwrite the parent's columns.
const LOCAL_ONLY_INSTANCE_FIELDS: [&str; 5] =
    ["id", "security_groups", "instance_type", "volumes", "cell_name"];

/// Creates a routed envelope.
#[must_use]
pub fn routed(
    dest: RoutePath,
    direction: Direction,
    method: MethodName,
    args: MethodArgs,
    routing_path: Option<RoutePath>,
    response_uuid: Option<ResponseId>,
) -> RoutedEnvelope {
    RoutedEnvelope {
        dest_cell_name: dest,
        routing_path,
        direction,
        message: MethodCall { method, args },
        response_uuid,
        need_response: None,
    }
}

/// Creates a freshly-originated routed envelope that expects a
/// response.
#[must_use]
pub fn routed_with_response(
    dest: RoutePath,
    direction: Direction,
    method: MethodName,
    args: MethodArgs,
) -> RoutedEnvelope {
    RoutedEnvelope {
        dest_cell_name: dest,
        routing_path: None,
        direction,
        message: MethodCall { method, args },
        response_uuid: None,
        need_response: Some(true),
    }
}

/// Creates a broadcast envelope.
#[must_use]
pub fn broadcast(
    direction: Direction,
    method: MethodName,
    args: MethodArgs,
    routing_path: Option<RoutePath>,
    hopcount: u32,
    fanout: bool,
) -> BroadcastEnvelope {
    BroadcastEnvelope {
        direction,
        message: MethodCall { method, args },
        routing_path,
        hopcount,
        fanout,
    }
}

/// Projects an instance record into the up-broadcast that replicates
/// it to ancestors.
///
/// Local-only fields are stripped, `info_cache` loses its row id, and
/// a list-form `metadata` collapses to a plain mapping.
#[must_use]
pub fn instance_update_broadcast(instance: &Fields) -> BroadcastEnvelope {
    let mut info = instance.clone();
    for field in LOCAL_ONLY_INSTANCE_FIELDS {
        info.remove(field);
    }

    match info.remove("info_cache") {
        Some(Value::Object(mut cache)) => {
            cache.remove("id");
            info.insert("info_cache".to_owned(), Value::Object(cache));
        }
        Some(Value::Null) | None => {}
        Some(other) => {
            info.insert("info_cache".to_owned(), other);
        }
    }

    if let Some(Value::Array(items)) = info.get("metadata") {
        let metadata: Fields = items
            .iter()
            .filter_map(|item| {
                let key = item.get("key")?.as_str()?.to_owned();
                let value = item.get("value")?.clone();
                Some((key, value))
            })
            .collect();
        info.insert("metadata".to_owned(), Value::Object(metadata));
    }

    let mut args = MethodArgs::new();
    args.insert("instance_info".to_owned(), Value::Object(info));
    broadcast(
        Direction::Up,
        MethodName::of("instance_update"),
        args,
        None,
        0,
        false,
    )
}

/// Creates the up-broadcast announcing an instance's deletion. Only
/// the uuid travels.
#[must_use]
pub fn instance_destroy_broadcast(instance: &Fields) -> BroadcastEnvelope {
    let mut info = Fields::new();
    info.insert(
        "uuid".to_owned(),
        instance.get("uuid").cloned().unwrap_or(Value::Null),
    );
    let mut args = MethodArgs::new();
    args.insert("instance_info".to_owned(), Value::Object(info));
    broadcast(
        Direction::Up,
        MethodName::of("instance_destroy"),
        args,
        None,
        0,
        false,
    )
}
