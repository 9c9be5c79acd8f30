//! Paths into parsed JSON documents
//!
//! `minecraft:entity/description/identifier` walks keys separated by `/`.
//! `*` expands to every child of an object or array, and a `[]` suffix
//! expands the elements of an array (`entries[].id` == `entries[]/id`).
//! Dots are part of keys, so `animation.walk` is a single key.

use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    /// Every child value of an object or array.
    Each,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentPath {
    segments: Vec<Segment>,
}

impl DocumentPath {
    pub fn parse(path: &str) -> Self {
        let mut segments = Vec::new();
        for piece in path.split('/') {
            let mut rest = piece;
            while let Some(idx) = rest.find("[]") {
                let key = &rest[..idx];
                if !key.is_empty() {
                    segments.push(Segment::Key(key.to_string()));
                }
                segments.push(Segment::Each);
                rest = &rest[idx + 2..];
                if let Some(stripped) = rest.strip_prefix('.') {
                    rest = stripped;
                }
            }
            match rest {
                "" => {}
                "*" => segments.push(Segment::Each),
                key => segments.push(Segment::Key(key.to_string())),
            }
        }
        DocumentPath { segments }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Every value the path reaches, in document order.
    pub fn resolve<'a>(&self, doc: &'a Value) -> Vec<&'a Value> {
        let mut current = vec![doc];
        for segment in &self.segments {
            let mut next = Vec::new();
            for value in current {
                match segment {
                    Segment::Key(key) => {
                        if let Some(child) = value.get(key.as_str()) {
                            next.push(child);
                        }
                    }
                    Segment::Each => match value {
                        Value::Array(items) => next.extend(items.iter()),
                        Value::Object(map) => next.extend(map.values()),
                        _ => {}
                    },
                }
            }
            current = next;
        }
        current
    }

    /// Apply `f` to every value the path reaches.
    pub fn for_each_mut(&self, doc: &mut Value, f: &mut dyn FnMut(&mut Value)) {
        visit_mut(&self.segments, doc, f);
    }
}

fn visit_mut(segments: &[Segment], value: &mut Value, f: &mut dyn FnMut(&mut Value)) {
    let Some((first, rest)) = segments.split_first() else {
        f(value);
        return;
    };
    match first {
        Segment::Key(key) => {
            if let Some(child) = value.get_mut(key.as_str()) {
                visit_mut(rest, child, f);
            }
        }
        Segment::Each => match value {
            Value::Array(items) => {
                for item in items.iter_mut() {
                    visit_mut(rest, item, f);
                }
            }
            Value::Object(map) => {
                for child in map.values_mut() {
                    visit_mut(rest, child, f);
                }
            }
            _ => {}
        },
    }
}
