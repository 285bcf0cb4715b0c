use std::collections::HashSet;

/// Strips all HTML tags from a string, leaving only the plain text content.
/// Used for titles, excerpts, names and every other single-line field.
pub fn strip_all_html(input: &str) -> String {
    ammonia::Builder::new()
        .tags(HashSet::new())
        .clean(input)
        .to_string()
}

/// Cleans rich HTML down to the safe tag set allowed in post bodies and
/// notification templates. Scripting attributes and unknown tags are removed
/// rather than escaped.
pub fn sanitize_rich_html(input: &str) -> String {
    let tags: HashSet<&str> = [
        "h1", "h2", "h3", "h4", "h5", "h6", "strong", "b", "em", "i", "a", "code", "p", "div",
        "ol", "ul", "li", "br", "button", "figure", "img", "iframe", "video", "audio",
    ]
    .into_iter()
    .collect();

    let attributes: HashSet<&str> = [
        "src", "href", "alt", "title", "class", "width", "height", "controls",
    ]
    .into_iter()
    .collect();

    ammonia::Builder::new()
        .tags(tags)
        .generic_attributes(attributes)
        .link_rel(Some("nofollow ugc"))
        .clean(input)
        .to_string()
}
