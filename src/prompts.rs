//! Prompts for image-to-HTML conversion.
//!
//! The prompt is assembled from three pieces: a fixed base instruction, one
//! fidelity clause chosen by [`FidelityBand`], and one color clause chosen by
//! `reproduce_colors`. Exactly one clause of each kind ends up in the text.
//!
//! Callers can replace the base instruction via
//! [`crate::config::ConverterConfig::system_prompt`]; the clauses are always
//! appended.

use crate::config::{ConversionOptions, FidelityBand};

/// Base instruction sent with every conversion request.
pub const BASE_PROMPT: &str = r#"You are an expert front-end developer specialising in HTML with inline CSS.

Convert the provided image of a user interface into an HTML fragment styled exclusively with inline styles (the style attribute).

Follow these requirements strictly:
- Do not use utility classes such as Tailwind CSS. Write every style directly in each element's style attribute.
- Build the layout with Flexbox or Grid expressed as inline styles.
- When a form control or button has a white background, set 'background-color: #ffffff;' explicitly so it stays visible in dark-mode editors. Do not apply it to the empty margins of the image.
- Output only the HTML fragment. Do not include <html>, <head> or <body> tags.
- Do not include script tags or <style> blocks.
- Use placeholder text read from the image when possible; otherwise use generic labels such as "Text input" or "Button"."#;

/// Fidelity 0–20.
pub const FIDELITY_SIMPLE_CLAUSE: &str = "- Prioritise a simple HTML structure and a small code size above everything else. A rough layout that shows which elements exist is enough. Ignore fine decoration such as rounded corners and shadows.";

/// Fidelity 21–80.
pub const FIDELITY_BALANCED_CLAUSE: &str = "- Balance visual fidelity against code simplicity. Reproduce the main layout, components and proportions accurately. Fine decoration may be omitted.";

/// Fidelity 81–100.
pub const FIDELITY_PRECISE_CLAUSE: &str = "- Prioritise visual fidelity above everything else. Aim for pixel-perfect output and pay close attention to layout, sizes, spacing, shadows, borders and every other visual detail. Complex HTML/CSS is acceptable.";

/// `reproduce_colors = true`.
pub const COLOR_FAITHFUL_CLAUSE: &str = "- Reproduce the color palette faithfully.";

/// `reproduce_colors = false`.
pub const COLOR_GRAYSCALE_CLAUSE: &str = "- IMPORTANT: Do not reproduce colors. Use only white, black and shades of gray. Ignore the colors of the original image and render it in monochrome.";

/// Instruction prepended to the previous fragment when refining.
pub const REFINE_INSTRUCTION: &str = "You previously converted the provided user-interface image into the HTML fragment below. Revise the fragment according to the user's instruction. Keep every part the instruction does not concern exactly as it is. Keep using inline styles only, with no <html>, <head> or <body> tags, no script tags and no <style> blocks. Output only the complete revised HTML fragment.";

/// Clause for a fidelity band.
pub fn fidelity_clause(band: FidelityBand) -> &'static str {
    match band {
        FidelityBand::Simple => FIDELITY_SIMPLE_CLAUSE,
        FidelityBand::Balanced => FIDELITY_BALANCED_CLAUSE,
        FidelityBand::Precise => FIDELITY_PRECISE_CLAUSE,
    }
}

/// Clause for the color toggle.
pub fn color_clause(reproduce_colors: bool) -> &'static str {
    if reproduce_colors {
        COLOR_FAITHFUL_CLAUSE
    } else {
        COLOR_GRAYSCALE_CLAUSE
    }
}

/// Assemble the conversion prompt for `options`.
///
/// `base` replaces [`BASE_PROMPT`] when provided.
pub fn build_prompt(options: &ConversionOptions, base: Option<&str>) -> String {
    let base = base.unwrap_or(BASE_PROMPT);
    format!(
        "{}\n{}\n{}",
        base.trim_end(),
        fidelity_clause(options.band()),
        color_clause(options.reproduce_colors)
    )
}

/// Assemble the refine prompt: the conversion rules for `options`, then the
/// previous fragment and the user's instruction.
pub fn build_refine_prompt(
    options: &ConversionOptions,
    base: Option<&str>,
    previous: &str,
    instruction: &str,
) -> String {
    format!(
        "{}\n\n{}\n\nPrevious fragment:\n\"\"\"\n{}\n\"\"\"\n\nUser instruction:\n\"\"\"\n{}\n\"\"\"",
        build_prompt(options, base),
        REFINE_INSTRUCTION,
        previous.trim(),
        instruction.trim()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIDELITY_CLAUSES: [&str; 3] = [
        FIDELITY_SIMPLE_CLAUSE,
        FIDELITY_BALANCED_CLAUSE,
        FIDELITY_PRECISE_CLAUSE,
    ];

    fn prompt_for(fidelity: u8, colors: bool) -> String {
        let options = ConversionOptions::default()
            .fidelity(fidelity)
            .reproduce_colors(colors);
        build_prompt(&options, None)
    }

    #[test]
    fn exactly_one_fidelity_clause_per_level() {
        let cases = [
            (0, FIDELITY_SIMPLE_CLAUSE),
            (20, FIDELITY_SIMPLE_CLAUSE),
            (21, FIDELITY_BALANCED_CLAUSE),
            (50, FIDELITY_BALANCED_CLAUSE),
            (80, FIDELITY_BALANCED_CLAUSE),
            (81, FIDELITY_PRECISE_CLAUSE),
            (100, FIDELITY_PRECISE_CLAUSE),
        ];
        for (level, expected) in cases {
            let prompt = prompt_for(level, true);
            assert!(prompt.contains(expected), "level {level}: missing clause");
            let present = FIDELITY_CLAUSES
                .iter()
                .filter(|c| prompt.contains(*c))
                .count();
            assert_eq!(present, 1, "level {level}: {present} fidelity clauses");
        }
    }

    #[test]
    fn color_clause_is_exclusive() {
        let colored = prompt_for(50, true);
        assert!(colored.contains(COLOR_FAITHFUL_CLAUSE));
        assert!(!colored.contains(COLOR_GRAYSCALE_CLAUSE));

        let gray = prompt_for(50, false);
        assert!(gray.contains(COLOR_GRAYSCALE_CLAUSE));
        assert!(!gray.contains(COLOR_FAITHFUL_CLAUSE));
    }

    #[test]
    fn prompt_starts_with_base_instruction() {
        let prompt = prompt_for(10, true);
        assert!(prompt.starts_with(BASE_PROMPT));
        assert!(prompt.ends_with(COLOR_FAITHFUL_CLAUSE));
    }

    #[test]
    fn custom_base_replaces_default() {
        let options = ConversionOptions::default();
        let prompt = build_prompt(&options, Some("Render as HTML.\n\n"));
        assert!(prompt.starts_with("Render as HTML.\n- "));
        assert!(!prompt.contains("expert front-end developer"));
        assert!(prompt.contains(FIDELITY_BALANCED_CLAUSE));
    }

    #[test]
    fn refine_prompt_embeds_previous_and_instruction() {
        let options = ConversionOptions::default().reproduce_colors(false);
        let prompt = build_refine_prompt(
            &options,
            None,
            "<div>old</div>\n",
            "  make the button red  ",
        );
        assert!(prompt.contains("\"\"\"\n<div>old</div>\n\"\"\""));
        assert!(prompt.contains("\"\"\"\nmake the button red\n\"\"\""));
        assert!(prompt.contains(COLOR_GRAYSCALE_CLAUSE));
        assert!(prompt.contains(REFINE_INSTRUCTION));
    }
}
