//! Dotted field path resolution.

/// Resolve a filter id against the alias of the entity being filtered.
///
/// Without an alias only bare field names match. With an alias, the id
/// must contain the alias segment followed by exactly one final segment,
/// which is returned as the field name. A final segment equal to the alias
/// itself is not a field.
pub fn resolve_field<'a>(id: Option<&'a str>, expected_alias: Option<&str>) -> Option<&'a str> {
    let id = id?;
    let segments: Vec<&'a str> = id.split('.').collect();

    let candidate = match expected_alias {
        None => {
            if segments.len() > 1 {
                return None;
            }
            id
        }
        Some(alias) => {
            let index = segments.iter().position(|segment| *segment == alias)?;
            // Trailing segments after the field are invalid.
            if index + 2 != segments.len() || segments[index + 1] == alias {
                return None;
            }
            segments[index + 1]
        }
    };

    if candidate.is_empty() {
        return None;
    }
    Some(candidate)
}
