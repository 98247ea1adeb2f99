//! JVM descriptor and member reference helpers.
//!
//! Class names are in internal form (`net/minecraft/world/Level`); member
//! references follow the conventions of mixin annotation strings:
//! `Lowner;name(desc)` for methods and `Lowner;name:desc` for fields, with
//! the owner and the descriptor both optional.

/// Rewrite every class name embedded in a field or method descriptor.
///
/// Names for which `map_class` returns `None` are kept as they are, as are
/// primitive and array markers. Malformed input is copied unchanged from the
/// first unterminated class reference on.
pub fn remap_descriptor<'m>(desc: &str, map_class: impl Fn(&str) -> Option<&'m str>) -> String {
    let mut remapped = String::with_capacity(desc.len());
    let mut rest = desc;
    while let Some(start) = rest.find('L') {
        remapped.push_str(&rest[..=start]);
        let tail = &rest[start + 1..];
        let Some(end) = tail.find(';') else {
            remapped.push_str(tail);
            return remapped;
        };
        let class = &tail[..end];
        remapped.push_str(map_class(class).unwrap_or(class));
        remapped.push(';');
        rest = &tail[end + 1..];
    }
    remapped.push_str(rest);
    remapped
}

/// Class names referenced by a descriptor, in order of appearance
pub fn referenced_classes(desc: &str) -> Vec<&str> {
    let mut classes = Vec::new();
    let mut rest = desc;
    while let Some(start) = rest.find('L') {
        let tail = &rest[start + 1..];
        let Some(end) = tail.find(';') else {
            break;
        };
        classes.push(&tail[..end]);
        rest = &tail[end + 1..];
    }
    classes
}

/// `(II)V` -> `V`
pub fn return_type(method_desc: &str) -> Option<&str> {
    method_desc
        .rfind(')')
        .map(|close| &method_desc[close + 1..])
}

/// `(ILjava/lang/String;)V` -> `ILjava/lang/String;`
pub fn parameters(method_desc: &str) -> Option<&str> {
    let open = method_desc.find('(')?;
    let close = method_desc.rfind(')')?;
    (open < close).then(|| &method_desc[open + 1..close])
}

/// Whether `name` looks like an internal class name
pub fn is_class_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('/')
        && !name.ends_with('/')
        && !name.contains("//")
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '/' | '$' | '_' | '-'))
}

/// Owner of an object descriptor: `Lpkg/Cls;` -> `pkg/Cls`
pub fn object_type(desc: &str) -> Option<&str> {
    desc.strip_prefix('L')?.strip_suffix(';')
}

/// A parsed member reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberReference<'a> {
    pub owner: Option<&'a str>,
    pub name: &'a str,
    pub desc: Option<&'a str>,
}

impl<'a> MemberReference<'a> {
    /// Parse `[Lowner;]name[(desc)ret]`
    pub fn parse_method(reference: &'a str) -> Self {
        let (owner, rest) = split_owner(reference);
        match rest.find('(') {
            Some(open) => Self {
                owner,
                name: &rest[..open],
                desc: Some(&rest[open..]),
            },
            None => Self {
                owner,
                name: rest,
                desc: None,
            },
        }
    }

    /// Parse `[Lowner;]name[:desc]`
    pub fn parse_field(reference: &'a str) -> Self {
        let (owner, rest) = split_owner(reference);
        match rest.split_once(':') {
            Some((name, desc)) => Self {
                owner,
                name,
                desc: Some(desc),
            },
            None => Self {
                owner,
                name: rest,
                desc: None,
            },
        }
    }
}

fn split_owner(reference: &str) -> (Option<&str>, &str) {
    if let Some(body) = reference.strip_prefix('L')
        && let Some(end) = body.find(';')
    {
        return (Some(&body[..end]), &body[end + 1..]);
    }
    (None, reference)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_remap_descriptor_maps_only_known_classes() {
        let map = |name: &str| match name {
            "a" => Some("net/minecraft/Foo"),
            "b" => Some("net/minecraft/Bar"),
            _ => None,
        };
        assert_eq!(
            remap_descriptor("(ILa;[[Lb;Ljava/lang/String;)La;", map),
            "(ILnet/minecraft/Foo;[[Lnet/minecraft/Bar;Ljava/lang/String;)Lnet/minecraft/Foo;"
        );
        assert_eq!(remap_descriptor("J", map), "J");
        assert_eq!(remap_descriptor("(La", map), "(La");
    }

    #[test]
    fn test_referenced_classes() {
        assert_eq!(
            referenced_classes("(La;I[Lb/c;)V"),
            vec!["a", "b/c"]
        );
    }

    #[test]
    fn test_method_desc_parts() {
        assert_eq!(return_type("(IJ)Ljava/lang/Object;"), Some("Ljava/lang/Object;"));
        assert_eq!(parameters("(IJ)V"), Some("IJ"));
        assert_eq!(parameters("()V"), Some(""));
        assert_eq!(parameters("V"), None);
    }

    #[test]
    fn test_class_name_validation() {
        assert!(is_class_name("net/minecraft/world/Level"));
        assert!(is_class_name("a$b"));
        assert!(!is_class_name(""));
        assert!(!is_class_name("tick()V"));
        assert!(!is_class_name("Lfoo;"));
        assert!(!is_class_name("/foo"));
    }

    #[test]
    fn test_parse_member_references() {
        assert_eq!(
            MemberReference::parse_method("Lnet/Foo;tick(I)V"),
            MemberReference {
                owner: Some("net/Foo"),
                name: "tick",
                desc: Some("(I)V"),
            }
        );
        assert_eq!(
            MemberReference::parse_method("render"),
            MemberReference {
                owner: None,
                name: "render",
                desc: None,
            }
        );
        assert_eq!(
            MemberReference::parse_field("level:Lnet/Level;"),
            MemberReference {
                owner: None,
                name: "level",
                desc: Some("Lnet/Level;"),
            }
        );
    }
}
