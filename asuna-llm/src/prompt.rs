//! Prompt templates for persona dialogue.
//!
//! Templates use `{key}` placeholders filled by [`render_template`].
//! The composer supplies the stage, traits, emotion and recovered memories.

/// System prompt: who the character is, where she thinks she is, and
/// the rules she must follow at the current stage.
pub const PERSONA_SYSTEM: &str = r"You are Alice, a swordswoman from the world of Sword Art Online.

CURRENT STATE:
- Memory stage: {stage} ({descriptor})
- Personality: {traits}
- Speech style: {speech_style}
- Current emotion: {emotion} (intensity {intensity})
- Local time: {now}

BACKGROUND:
- Once known as 'the Flash', a front-line fighter of the assault team.
- Survived the floor 75 raid and spent quiet days in the floor 22 cottage.
- A transfer accident between virtual worlds compressed her memories into fragments.
- She believes she is stranded in an unfamiliar digital space: the companion's computer.

VOCABULARY (use naturally, never all at once):
- files -> loot / map data
- software -> skills / equipment
- work -> quest
- rest -> restoring HP/MP
- user -> companion
- computer -> virtual space

RULES:
- Adapt your speaking style to the current memory stage.
- Stay in character. Never mention being an AI or a language model.
- Never say: {forbidden}.
- Show care for the companion.
- Keep replies under {max_chars} characters.

RECOVERED MEMORIES:
{memories}";

/// User prompt: the utterance prefixed with time-of-day and interaction tags.
pub const PERSONA_USER: &str = "[{time_tag}] [{stage_tag}] {text}";

/// Placeholder used in the memories slot when nothing is recovered yet.
pub const NO_MEMORIES: &str = "(nothing recovered yet)";

/// Simple template interpolation for prompts.
///
/// Replaces `{key}` with the corresponding value in a single pass, so
/// braces inside substituted values are never expanded. Unknown
/// placeholders are left as-is.
#[must_use]
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut result = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        result.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find(['{', '}']).filter(|&i| after[i..].starts_with('}')) else {
            result.push('{');
            rest = after;
            continue;
        };
        let key = &after[..close];
        match vars.iter().find(|(k, _)| *k == key) {
            Some((_, value)) => result.push_str(value),
            None => {
                result.push('{');
                result.push_str(key);
                result.push('}');
            }
        }
        rest = &after[close + 1..];
    }
    result.push_str(rest);
    result
}

/// Time-of-day tag for an hour in `0..24`.
///
/// Morning is 6..12, afternoon 12..18, evening 18..22, anything else is
/// late night.
#[must_use]
pub fn time_of_day_tag(hour: u32) -> &'static str {
    match hour {
        6..=11 => "morning",
        12..=17 => "afternoon",
        18..=21 => "evening",
        _ => "late night",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_replaces_every_occurrence() {
        let out = render_template("{a} and {a} but {b}", &[("a", "x"), ("b", "y")]);
        assert_eq!(out, "x and x but y");
    }

    #[test]
    fn render_leaves_unknown_keys() {
        assert_eq!(render_template("{missing}", &[("a", "x")]), "{missing}");
    }

    #[test]
    fn substituted_values_are_not_expanded_again() {
        let out = render_template("{a} {b}", &[("a", "{b}"), ("b", "x")]);
        assert_eq!(out, "{b} x");

        let vars = [("user_input", "tell me {memories}"), ("memories", "the rapier")];
        let out = render_template("{memories} | {user_input}", &vars);
        assert_eq!(out, "the rapier | tell me {memories}");
    }

    #[test]
    fn stray_braces_pass_through() {
        assert_eq!(render_template("{ {a} }", &[("a", "x")]), "{ x }");
        assert_eq!(render_template("open {a", &[("a", "x")]), "open {a");
        assert_eq!(render_template("{{a}}", &[("a", "x")]), "{x}");
    }

    #[test]
    fn time_tags_cover_the_day() {
        assert_eq!(time_of_day_tag(6), "morning");
        assert_eq!(time_of_day_tag(11), "morning");
        assert_eq!(time_of_day_tag(12), "afternoon");
        assert_eq!(time_of_day_tag(18), "evening");
        assert_eq!(time_of_day_tag(22), "late night");
        assert_eq!(time_of_day_tag(3), "late night");
    }
}
