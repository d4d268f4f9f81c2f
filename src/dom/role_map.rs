//! Maps EPUB structural semantics (`epub:type`) to ARIA roles.
//!
//! Two tables coexist: the DPUB-ARIA 1.0 mapping used for EPUB 3.0 to 3.2,
//! and the DPUB-ARIA 1.1 mapping for EPUB 3.3, which drops the deprecated
//! `doc-biblioentry` and `doc-endnote` roles. EPUB 2 has no role mapping.
//!
//! A mapped role is only produced when ARIA in HTML permits it on the element
//! carrying the token.

use std::collections::HashMap;
use std::sync::LazyLock;

use super::arena::{Document, NodeId};
use crate::epub::EpubVersion;

/// One `epub:type` token and the role it maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SemanticRoleRule {
    pub token: &'static str,
    pub role: &'static str,
}

const fn rule(token: &'static str, role: &'static str) -> SemanticRoleRule {
    SemanticRoleRule { token, role }
}

/// Structural semantics vocabulary mapped by DPUB-ARIA 1.0.
pub static DPUB_ARIA_1_0_RULES: &[SemanticRoleRule] = &[
    rule("abstract", "doc-abstract"),
    rule("acknowledgments", "doc-acknowledgments"),
    rule("afterword", "doc-afterword"),
    rule("appendix", "doc-appendix"),
    rule("biblioentry", "doc-biblioentry"),
    rule("bibliography", "doc-bibliography"),
    rule("biblioref", "doc-biblioref"),
    rule("chapter", "doc-chapter"),
    rule("colophon", "doc-colophon"),
    rule("conclusion", "doc-conclusion"),
    rule("cover-image", "doc-cover"),
    rule("credit", "doc-credit"),
    rule("credits", "doc-credits"),
    rule("dedication", "doc-dedication"),
    rule("endnote", "doc-endnote"),
    rule("endnotes", "doc-endnotes"),
    rule("epigraph", "doc-epigraph"),
    rule("epilogue", "doc-epilogue"),
    rule("errata", "doc-errata"),
    rule("figure", "figure"),
    rule("footnote", "doc-footnote"),
    rule("foreword", "doc-foreword"),
    rule("glossary", "doc-glossary"),
    rule("glossdef", "definition"),
    rule("glossref", "doc-glossref"),
    rule("glossterm", "term"),
    rule("index", "doc-index"),
    rule("introduction", "doc-introduction"),
    rule("landmarks", "directory"),
    rule("list", "list"),
    rule("list-item", "listitem"),
    rule("noteref", "doc-noteref"),
    rule("notice", "doc-notice"),
    rule("page-list", "doc-pagelist"),
    rule("pagebreak", "doc-pagebreak"),
    rule("part", "doc-part"),
    rule("preface", "doc-preface"),
    rule("prologue", "doc-prologue"),
    rule("pullquote", "doc-pullquote"),
    rule("qna", "doc-qna"),
    rule("referrer", "doc-backlink"),
    rule("subtitle", "doc-subtitle"),
    rule("table", "table"),
    rule("table-row", "row"),
    rule("table-cell", "cell"),
    rule("tip", "doc-tip"),
    rule("toc", "doc-toc"),
];

/// Roles deprecated by DPUB-ARIA 1.1.
const DEPRECATED_IN_1_1: &[&str] = &["doc-biblioentry", "doc-endnote"];

static DPUB_ARIA_1_0: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    DPUB_ARIA_1_0_RULES
        .iter()
        .map(|r| (r.token, r.role))
        .collect()
});

static DPUB_ARIA_1_1: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    DPUB_ARIA_1_0_RULES
        .iter()
        .filter(|r| !DEPRECATED_IN_1_1.contains(&r.role))
        .map(|r| (r.token, r.role))
        .collect()
});

/// Which mapping table applies to a publication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleTable {
    DpubAria10,
    DpubAria11,
}

impl RoleTable {
    /// Table for an EPUB version, or `None` for EPUB 2.
    pub fn for_version(version: EpubVersion) -> Option<Self> {
        match version {
            EpubVersion::Epub2 => None,
            EpubVersion::Epub30 => Some(RoleTable::DpubAria10),
            EpubVersion::Epub33 => Some(RoleTable::DpubAria11),
        }
    }

    fn map(self) -> &'static HashMap<&'static str, &'static str> {
        match self {
            RoleTable::DpubAria10 => &DPUB_ARIA_1_0,
            RoleTable::DpubAria11 => &DPUB_ARIA_1_1,
        }
    }

    /// Role for a single token, regardless of element.
    pub fn lookup(self, token: &str) -> Option<&'static str> {
        self.map().get(token).copied()
    }

    pub fn len(self) -> usize {
        self.map().len()
    }

    pub fn is_empty(self) -> bool {
        self.map().is_empty()
    }
}

// ---- Element restrictions ----

/// Elements that accept any role: `(tag, href_allowed, needs_alt)`.
const ANY_ROLE_TAGS: &[(&str, bool, bool)] = &[
    ("a", false, false),
    ("abbr", true, false),
    ("address", true, false),
    ("b", true, false),
    ("bdi", true, false),
    ("bdo", true, false),
    ("blockquote", true, false),
    ("br", true, false),
    ("canvas", true, false),
    ("cite", true, false),
    ("code", true, false),
    ("del", true, false),
    ("dfn", true, false),
    ("div", true, false),
    ("em", true, false),
    ("i", true, false),
    ("img", false, true),
    ("ins", true, false),
    ("kbd", true, false),
    ("mark", true, false),
    ("output", true, false),
    ("p", true, false),
    ("pre", true, false),
    ("q", true, false),
    ("rp", true, false),
    ("rt", true, false),
    ("ruby", true, false),
    ("s", true, false),
    ("samp", true, false),
    ("small", true, false),
    ("span", true, false),
    ("strong", true, false),
    ("sub", true, false),
    ("sup", true, false),
    ("table", true, false),
    ("tbody", true, false),
    ("td", true, false),
    ("tfoot", true, false),
    ("thead", true, false),
    ("th", true, false),
    ("tr", true, false),
    ("time", true, false),
    ("u", true, false),
    ("var", true, false),
    ("wbr", true, false),
];

/// Additional elements a specific role is allowed on.
fn role_allowed_tags(role: &str) -> &'static [&'static str] {
    match role {
        "doc-abstract" | "doc-acknowledgments" | "doc-afterword" | "doc-appendix"
        | "doc-bibliography" | "doc-chapter" | "doc-colophon" | "doc-conclusion"
        | "doc-credit" | "doc-credits" | "doc-dedication" | "doc-endnotes" | "doc-epilogue"
        | "doc-errata" | "doc-foreword" | "doc-glossary" | "doc-introduction" | "doc-notice"
        | "doc-part" | "doc-preface" | "doc-prologue" | "doc-qna" => &["section"],
        "doc-biblioentry" | "doc-endnote" => &["li"],
        "doc-biblioref" | "doc-glossref" | "doc-noteref" | "doc-backlink" => &["a"],
        "doc-cover" => &["img"],
        "doc-footnote" => &["aside", "footer", "header"],
        "doc-index" | "doc-pagelist" | "doc-toc" => &["nav", "section"],
        "directory" => &["ol", "ul"],
        "doc-pagebreak" => &["hr"],
        "doc-pullquote" => &["aside", "section"],
        "doc-subtitle" => &["h1", "h2", "h3", "h4", "h5", "h6"],
        "doc-tip" => &["aside"],
        _ => &[],
    }
}

/// What the mapper needs to know about the element carrying the tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementContext<'a> {
    /// Local element name.
    pub tag: &'a str,
    pub has_href: bool,
    pub has_alt: bool,
}

impl<'a> ElementContext<'a> {
    pub fn new(tag: &'a str) -> Self {
        Self {
            tag,
            has_href: false,
            has_alt: false,
        }
    }
}

/// Whether ARIA in HTML allows `role` on the described element.
pub fn role_allowed(role: &str, element: &ElementContext<'_>) -> bool {
    if let Some(&(_, href_allowed, needs_alt)) =
        ANY_ROLE_TAGS.iter().find(|(tag, _, _)| *tag == element.tag)
        && (href_allowed || !element.has_href)
        && (!needs_alt || element.has_alt)
    {
        return true;
    }
    role_allowed_tags(role).contains(&element.tag)
}

/// Role for one token on a given element, if the token is recognized and the
/// role is allowed there.
pub fn role_for_token(
    table: RoleTable,
    token: &str,
    element: &ElementContext<'_>,
) -> Option<&'static str> {
    table
        .lookup(token)
        .filter(|role| role_allowed(role, element))
}

/// Map a whitespace-separated `epub:type` value to a role attribute value.
///
/// Distinct roles are joined with a space in token order. Unrecognized or
/// disallowed tokens are skipped; `None` means nothing to write.
pub fn map_roles(table: RoleTable, epub_type: &str, element: &ElementContext<'_>) -> Option<String> {
    let mut roles: Vec<&str> = Vec::new();
    for token in epub_type.split_ascii_whitespace() {
        if let Some(role) = role_for_token(table, token, element)
            && !roles.contains(&role)
        {
            roles.push(role);
        }
    }
    (!roles.is_empty()).then(|| roles.join(" "))
}

/// Role to write on an element of a parsed document.
///
/// Returns `None` for `<body>`, for elements that already carry a non-empty
/// `role`, and for elements without a mappable `epub:type`.
pub fn element_role(doc: &Document, id: NodeId, table: RoleTable) -> Option<String> {
    let epub_type = doc.get_attr(id, "epub:type")?;
    element_role_for_type(doc, id, table, &epub_type)
}

/// Like [`element_role`], with `epub_type` standing in for the element's
/// own `epub:type` (used when a pending patch changes it).
pub fn element_role_for_type(
    doc: &Document,
    id: NodeId,
    table: RoleTable,
    epub_type: &str,
) -> Option<String> {
    let tag = doc.local_name(id)?;
    if tag == "body" {
        return None;
    }
    if doc
        .get_attr(id, "role")
        .is_some_and(|role| !role.trim().is_empty())
    {
        return None;
    }
    let element = ElementContext {
        tag,
        has_href: doc.has_attr(id, "href"),
        has_alt: doc.has_attr(id, "alt"),
    };
    map_roles(table, epub_type, &element)
}
