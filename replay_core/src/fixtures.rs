//! Logs bundled with the crate, selectable by index like the viewer's
//! built-in test models.

/// `(name, raw json)` pairs.
pub const BUILTIN_LOGS: &[(&str, &str)] = &[
    ("cylinder_box", include_str!("../fixtures/cylinder_box.json")),
    ("orbit_legacy", include_str!("../fixtures/orbit_legacy.json")),
];

/// Raw JSON of built-in log `index`.
pub fn builtin(index: usize) -> Option<&'static str> {
    BUILTIN_LOGS.get(index).map(|(_, raw)| *raw)
}

/// Finds a built-in log by name.
pub fn builtin_by_name(name: &str) -> Option<&'static str> {
    BUILTIN_LOGS
        .iter()
        .find(|(candidate, _)| *candidate == name)
        .map(|(_, raw)| *raw)
}
