use regex::Regex;
use std::sync::OnceLock;

static BEGIN_ENV: OnceLock<Regex> = OnceLock::new();

/// Wraps LaTeX environments that start a line in `$$` so the markdown
/// tokenizer hands them over verbatim as display math.
///
/// Environments already inside a `$$` region or a code fence are left alone,
/// as is an environment with no matching `\end`. Blank lines inside an
/// environment are dropped since they would end the surrounding paragraph.
/// Text after the closing `\end{..}` becomes a paragraph of its own.
pub fn lift_environments(text: &str) -> String {
    let begin = BEGIN_ENV.get_or_init(|| {
        Regex::new(r"^\s*\\begin\{([^}]+)\}").expect("Invalid environment regex")
    });

    let lines: Vec<&str> = text.lines().collect();
    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    let mut in_display = false;
    let mut in_fence = false;
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        if !in_display && is_fence(line) {
            in_fence = !in_fence;
        } else if !in_display
            && !in_fence
            && let Some(caps) = begin.captures(line)
        {
            let end_marker = format!("\\end{{{}}}", &caps[1]);
            if let Some(offset) = lines[i..].iter().position(|l| l.contains(&end_marker)) {
                let last = lines[i + offset];
                let split = last
                    .find(&end_marker)
                    .map_or(last.len(), |p| p + end_marker.len());
                let (closing, trailing) = last.split_at(split);

                let mut body: Vec<&str> = lines[i..i + offset]
                    .iter()
                    .copied()
                    .filter(|l| !l.trim().is_empty())
                    .collect();
                body.push(closing);
                out.push(String::new());
                out.push(format!("$${}$$", body.join("\n")));
                out.push(String::new());
                if !trailing.trim().is_empty() {
                    out.push(trailing.trim().to_string());
                    out.push(String::new());
                }
                i += offset + 1;
                continue;
            }
        }
        if !in_fence && line.matches("$$").count() % 2 == 1 {
            in_display = !in_display;
        }
        out.push(line.to_string());
        i += 1;
    }

    out.join("\n")
}

fn is_fence(line: &str) -> bool {
    let line = line.trim_start();
    line.starts_with("```") || line.starts_with("~~~")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn text_without_environments_is_unchanged() {
        assert_eq!(lift_environments("a\nb"), "a\nb");
    }

    #[test]
    fn environment_is_wrapped_in_display_math() {
        let text = "intro\n\\begin{align}\nx &= 1 \\\\\n\ny &= 2\n\\end{align}\nafter";

        assert_eq!(
            lift_environments(text),
            "intro\n\n$$\\begin{align}\nx &= 1 \\\\\ny &= 2\n\\end{align}$$\n\nafter"
        );
    }

    #[test]
    fn unterminated_environment_is_left_alone() {
        let text = "\\begin{cases}\nx";
        assert_eq!(lift_environments(text), text);
    }

    #[test]
    fn environment_inside_code_fence_is_left_alone() {
        let text = "```latex\n\\begin{align}\nx\n\\end{align}\n```\nafter";
        assert_eq!(lift_environments(text), text);
    }

    #[test]
    fn text_after_end_is_kept_as_a_paragraph() {
        let text = "\\begin{cases}\nx\n\\end{cases} so x holds";
        assert_eq!(
            lift_environments(text),
            "\n$$\\begin{cases}\nx\n\\end{cases}$$\n\nso x holds\n"
        );
    }

    #[test]
    fn environment_inside_display_math_is_left_alone() {
        let text = "$$\n\\begin{matrix}\n1\n\\end{matrix}\n$$";
        assert_eq!(lift_environments(text), text);
    }
}
