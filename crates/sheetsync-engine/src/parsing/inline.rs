use pulldown_cmark::{CowStr, Event, Options, Parser, Tag, TagEnd, TextMergeStream};

use crate::models::{Annotations, InlineSpan};

/// Markdown extensions understood by both parsers.
pub fn markdown_options() -> Options {
    Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH | Options::ENABLE_MATH
}

/// Runs the markdown tokenizer over `text`.
///
/// Line breaks are folded into `"\n"` text and adjacent text events are
/// merged, so every plain run reaches the span collector as one event.
pub fn tokenize(text: &str) -> Vec<Event<'_>> {
    let events = Parser::new_ext(text, markdown_options()).map(|event| match event {
        Event::SoftBreak | Event::HardBreak => Event::Text(CowStr::Borrowed("\n")),
        other => other,
    });
    TextMergeStream::new(events).collect()
}

/// Parses a markdown-like string into styled inline spans.
///
/// `defaults` seeds the annotation state, for text that already sits inside
/// a styled context. Block structure in `text` is flattened: markers are
/// dropped and consecutive blocks are separated by a newline.
pub fn parse_inline(text: &str, defaults: Annotations) -> Vec<InlineSpan> {
    if text.is_empty() {
        return Vec::new();
    }

    let mut collector = SpanCollector::new(defaults);
    let mut pending_break = false;
    for event in tokenize(text) {
        if is_inline_event(&event) {
            if pending_break && carries_content(&event) {
                collector.line_break();
                pending_break = false;
            }
            collector.push(&event);
        } else if collector.has_spans() {
            pending_break = true;
        }
    }
    collector.finish()
}

/// Whether an event belongs inside a block's rich text.
pub(crate) fn is_inline_event(event: &Event<'_>) -> bool {
    match event {
        Event::Start(tag) => matches!(
            tag,
            Tag::Emphasis | Tag::Strong | Tag::Strikethrough | Tag::Link { .. } | Tag::Image { .. }
        ),
        Event::End(tag) => matches!(
            tag,
            TagEnd::Emphasis | TagEnd::Strong | TagEnd::Strikethrough | TagEnd::Link | TagEnd::Image
        ),
        Event::Text(_)
        | Event::Code(_)
        | Event::InlineMath(_)
        | Event::DisplayMath(_)
        | Event::InlineHtml(_)
        | Event::FootnoteReference(_)
        | Event::SoftBreak
        | Event::HardBreak => true,
        _ => false,
    }
}

fn carries_content(event: &Event<'_>) -> bool {
    matches!(
        event,
        Event::Text(_) | Event::Code(_) | Event::InlineMath(_) | Event::DisplayMath(_)
    )
}

/// Turns inline events into spans using a flat toggle state.
///
/// Open/close markers flip one flag each; nesting of the same marker is not
/// tracked. Every emitted span copies the current flags.
#[derive(Debug)]
pub(crate) struct SpanCollector {
    state: Annotations,
    link: Option<String>,
    image_depth: usize,
    spans: Vec<InlineSpan>,
}

impl SpanCollector {
    pub(crate) fn new(defaults: Annotations) -> Self {
        Self {
            state: Annotations {
                code: false,
                ..defaults
            },
            link: None,
            image_depth: 0,
            spans: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, event: &Event<'_>) {
        match event {
            Event::Start(Tag::Strong) => self.state.bold = true,
            Event::End(TagEnd::Strong) => self.state.bold = false,
            Event::Start(Tag::Emphasis) => self.state.italic = true,
            Event::End(TagEnd::Emphasis) => self.state.italic = false,
            Event::Start(Tag::Strikethrough) => self.state.strikethrough = true,
            Event::End(TagEnd::Strikethrough) => self.state.strikethrough = false,
            Event::Start(Tag::Link { dest_url, .. }) => self.link = Some(dest_url.to_string()),
            Event::End(TagEnd::Link) => self.link = None,
            // Image alt text is not part of the rich text.
            Event::Start(Tag::Image { .. }) => self.image_depth += 1,
            Event::End(TagEnd::Image) => self.image_depth = self.image_depth.saturating_sub(1),
            _ if self.image_depth > 0 => {}
            Event::Text(text) => self.push_text(text),
            Event::Code(code) => self.spans.push(InlineSpan::code(code.to_string())),
            Event::InlineMath(math) | Event::DisplayMath(math) => self
                .spans
                .push(InlineSpan::equation(math.to_string(), self.state)),
            _ => {}
        }
    }

    pub(crate) fn line_break(&mut self) {
        self.push_text("\n");
    }

    pub(crate) fn has_spans(&self) -> bool {
        !self.spans.is_empty()
    }

    pub(crate) fn finish(self) -> Vec<InlineSpan> {
        self.spans
    }

    fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(last) = self.spans.last_mut()
            && last.is_plain_text()
            && last.annotations == self.state
            && last.link == self.link
        {
            last.content.push_str(text);
            return;
        }
        self.spans
            .push(InlineSpan::text(text, self.state).with_link(self.link.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SpanKind;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn bold() -> Annotations {
        Annotations::styled(true, false, false, false)
    }

    #[test]
    fn empty_input_gives_no_spans() {
        assert_eq!(parse_inline("", Annotations::PLAIN), vec![]);
    }

    #[test]
    fn plain_text_is_one_span() {
        assert_eq!(
            parse_inline("Hello world", Annotations::PLAIN),
            vec![InlineSpan::plain("Hello world")]
        );
    }

    #[test]
    fn bold_scope_ends_at_close_marker() {
        let spans = parse_inline("**Hello** world", Annotations::PLAIN);

        assert_eq!(
            spans,
            vec![InlineSpan::text("Hello", bold()), InlineSpan::plain(" world")]
        );
    }

    #[test]
    fn parsing_is_repeatable() {
        let text = "a *b* ~~c~~ `d` $e$ [f](https://x.test)";
        assert_eq!(
            parse_inline(text, Annotations::PLAIN),
            parse_inline(text, Annotations::PLAIN)
        );
    }

    #[test]
    fn earlier_spans_keep_their_snapshot() {
        let spans = parse_inline("a **b** c", Annotations::PLAIN);

        assert_eq!(spans.len(), 3);
        assert!(!spans[0].annotations.bold);
        assert!(spans[1].annotations.bold);
        assert!(!spans[2].annotations.bold);
    }

    #[test]
    fn defaults_seed_state_until_a_close_marker() {
        let spans = parse_inline("plain *it*", bold());

        assert!(spans.iter().all(|s| s.annotations.bold));
        assert!(spans[1].annotations.italic);
    }

    #[test]
    fn underline_default_applies_to_every_text_span() {
        let underline = Annotations::styled(false, false, true, false);
        let spans = parse_inline("x **y**", underline);
        assert!(spans.iter().all(|s| s.annotations.underline));
    }

    #[test]
    fn code_span_ignores_ambient_styling() {
        let spans = parse_inline("**see `x + 1`**", Annotations::PLAIN);

        assert_eq!(spans[1], InlineSpan::code("x + 1"));
        assert!(!spans[1].annotations.bold);
        assert!(spans[1].annotations.code);
    }

    #[rstest]
    #[case("$x^2$", "x^2")]
    #[case("$$\\frac{a}{b}$$", "\\frac{a}{b}")]
    fn math_becomes_equation_span(#[case] input: &str, #[case] expression: &str) {
        let spans = parse_inline(input, Annotations::PLAIN);

        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].kind, SpanKind::Equation);
        assert_eq!(spans[0].content, expression);
    }

    #[test]
    fn math_carries_ambient_styling() {
        let spans = parse_inline("*$y$*", Annotations::PLAIN);

        assert_eq!(spans[0].kind, SpanKind::Equation);
        assert!(spans[0].annotations.italic);
        assert!(!spans[0].annotations.code);
    }

    #[test]
    fn strikethrough_toggles() {
        let spans = parse_inline("~~old~~ new", Annotations::PLAIN);
        assert!(spans[0].annotations.strikethrough);
        assert_eq!(spans[0].content, "old");
        assert!(!spans[1].annotations.strikethrough);
    }

    #[test]
    fn link_text_carries_url() {
        let spans = parse_inline("see [docs](https://docs.test) now", Annotations::PLAIN);

        assert_eq!(spans.len(), 3);
        assert_eq!(spans[1].content, "docs");
        assert_eq!(spans[1].link.as_deref(), Some("https://docs.test"));
        assert_eq!(spans[2].link, None);
    }

    #[test]
    fn soft_breaks_stay_in_the_text() {
        assert_eq!(
            parse_inline("one\ntwo", Annotations::PLAIN),
            vec![InlineSpan::plain("one\ntwo")]
        );
    }

    #[test]
    fn block_markers_are_dropped() {
        assert_eq!(
            parse_inline("# Title", Annotations::PLAIN),
            vec![InlineSpan::plain("Title")]
        );
        assert_eq!(
            parse_inline("first\n\nsecond", Annotations::PLAIN),
            vec![InlineSpan::plain("first\nsecond")]
        );
    }

    #[test]
    fn image_alt_text_is_skipped() {
        assert_eq!(
            parse_inline("a ![alt](https://img.test/x.png) b", Annotations::PLAIN),
            vec![InlineSpan::plain("a  b")]
        );
    }
}
