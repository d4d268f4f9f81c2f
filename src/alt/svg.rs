//! Description of an SVG image: the `<desc>` that is a direct child of the
//! root `<svg>` element.

use quick_xml::Reader;
use quick_xml::events::Event;

use crate::util::{local_name, resolve_entity};

/// Extract the top-level `<desc>` text of an SVG document.
///
/// Only a `desc` directly under the root `svg` counts; descriptions of
/// nested groups or shapes are ignored. Prefixed (`svg:desc`) and unprefixed
/// names are treated alike. Returns `None` if there is no such element, it is
/// blank, or the markup cannot be read.
pub fn extract_description(svg: &str) -> Option<String> {
    let mut reader = Reader::from_str(svg);
    reader.config_mut().trim_text(false);

    let mut depth = 0usize;
    let mut root_is_svg = false;
    let mut in_desc = false;
    let mut text = String::new();

    loop {
        let event = match reader.read_event() {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!("unreadable SVG markup: {e}");
                return None;
            }
        };

        match event {
            Event::Start(e) => {
                depth += 1;
                let name = e.name();
                let local = local_name(std::str::from_utf8(name.as_ref()).unwrap_or(""));
                if depth == 1 {
                    root_is_svg = local == "svg";
                    if !root_is_svg {
                        return None;
                    }
                } else if depth == 2 && local == "desc" {
                    in_desc = true;
                }
            }
            // A self-closed root has no children.
            Event::Empty(_) if depth == 0 => return None,
            Event::End(_) => {
                if in_desc && depth == 2 {
                    let trimmed = text.trim();
                    if !trimmed.is_empty() {
                        return Some(trimmed.to_string());
                    }
                    in_desc = false;
                    text.clear();
                }
                depth = depth.saturating_sub(1);
                if depth == 0 && root_is_svg {
                    return None;
                }
            }
            Event::Text(e) if in_desc => {
                text.push_str(&String::from_utf8_lossy(&e));
            }
            Event::GeneralRef(e) if in_desc => {
                let entity = String::from_utf8_lossy(&e);
                match resolve_entity(&entity) {
                    Some(resolved) => text.push_str(&resolved),
                    None => {
                        text.push('&');
                        text.push_str(&entity);
                        text.push(';');
                    }
                }
            }
            Event::CData(e) if in_desc => {
                text.push_str(&String::from_utf8_lossy(&e));
            }
            Event::Eof => return None,
            _ => {}
        }
    }
}
