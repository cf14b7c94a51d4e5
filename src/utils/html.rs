// src/utils/html.rs

/// Clean admin-authored HTML using the ammonia library.
///
/// Question prompts, options and explanations may carry light markup
/// (<b>, <code>, <sub>) but are rendered to every student taking a test,
/// so scripts, iframes and event-handler attributes are stripped on write.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}
