// ---------------------------------------------------------------------------
// Host entity domains
// ---------------------------------------------------------------------------

/// The closed set of host domains recognized in entity references.
///
/// A dotted name `<domain>.<object_id>` is only treated as an entity
/// reference when `<domain>` appears here; any other dotted name parses as
/// an attribute path rooted at a variable.
pub const HOST_DOMAINS: &[&str] = &[
    "sensor",
    "binary_sensor",
    "switch",
    "light",
    "climate",
    "cover",
    "fan",
    "lock",
    "number",
    "select",
    "input_number",
    "input_boolean",
    "input_text",
    "input_select",
    "sun",
    "weather",
    "device_tracker",
    "person",
    "counter",
    "button",
];

/// True when `name` is a recognized host domain.
pub fn is_host_domain(name: &str) -> bool {
    HOST_DOMAINS.contains(&name)
}

/// True when `name` has the shape `<domain>.<object_id>` with a recognized
/// domain.
pub fn is_entity_reference(name: &str) -> bool {
    match name.split_once('.') {
        Some((domain, object)) => {
            is_host_domain(domain)
                && !object.is_empty()
                && !object.contains('.')
                && object
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    }
}
