//! Deterministic facts about a sample: language, region tags, comment-free
//! text and the pre-analysis gate.

use anyhow::{bail, Result};
use regex::Regex;
use serde::{Serialize, Serializer};
use std::collections::BTreeSet;
use std::sync::{Arc, OnceLock};
use tokio::task::JoinError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Python,
    Java,
    Go,
    Ruby,
    Rust,
    CSharp,
    Cpp,
    Php,
    Terraform,
    JavaScript,
    Shell,
    Html,
    Xml,
    Unknown,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "Python",
            Language::Java => "Java",
            Language::Go => "Go",
            Language::Ruby => "Ruby",
            Language::Rust => "Rust",
            Language::CSharp => "C#",
            Language::Cpp => "C++",
            Language::Php => "PHP",
            Language::Terraform => "Terraform",
            Language::JavaScript => "JavaScript",
            Language::Shell => "Shell",
            Language::Html => "HTML",
            Language::Xml => "XML",
            Language::Unknown => "Unknown",
        }
    }

    /// Languages the rubric is calibrated for.
    pub fn is_supported(&self) -> bool {
        matches!(
            self,
            Language::CSharp
                | Language::Cpp
                | Language::Go
                | Language::Java
                | Language::JavaScript
                | Language::Php
                | Language::Python
                | Language::Ruby
                | Language::Terraform
        )
    }

    fn comment_style(&self) -> CommentStyle {
        match self {
            Language::Python | Language::Shell | Language::Ruby => CommentStyle::Hash,
            Language::Java
            | Language::Go
            | Language::Rust
            | Language::CSharp
            | Language::Cpp
            | Language::Php
            | Language::Terraform
            | Language::JavaScript => CommentStyle::CFamily,
            Language::Html | Language::Xml => CommentStyle::Markup,
            Language::Unknown => CommentStyle::None,
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Language {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Extension table. `Unknown` entries are known to carry no rubric language
/// and skip the content fallback.
const EXTENSIONS: &[(&str, Language)] = &[
    ("py", Language::Python),
    ("java", Language::Java),
    ("groovy", Language::Java),
    ("kt", Language::Java),
    ("scala", Language::Java),
    ("go", Language::Go),
    ("rb", Language::Ruby),
    ("rs", Language::Rust),
    ("cs", Language::CSharp),
    ("cpp", Language::Cpp),
    ("cc", Language::Cpp),
    ("h", Language::Cpp),
    ("c", Language::Cpp),
    ("hpp", Language::Cpp),
    ("php", Language::Php),
    ("tf", Language::Terraform),
    ("js", Language::JavaScript),
    ("ts", Language::JavaScript),
    ("jsx", Language::JavaScript),
    ("tsx", Language::JavaScript),
    ("sh", Language::Unknown),
    ("yaml", Language::Unknown),
    ("xml", Language::Unknown),
];

fn language_from_url(url: &str) -> Option<Language> {
    let path = url::Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| url.split(['?', '#']).next().unwrap_or(url).to_string());
    let file = path.rsplit('/').next()?;
    let (_, ext) = file.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    EXTENSIONS
        .iter()
        .find(|(known, _)| *known == ext)
        .map(|(_, language)| *language)
}

/// Content signatures, checked in order; the first hit wins.
fn signatures() -> &'static [(Language, Regex)] {
    static SIGNATURES: OnceLock<Vec<(Language, Regex)>> = OnceLock::new();
    SIGNATURES.get_or_init(|| {
        [
            (Language::Php, r"<\?php"),
            (Language::Terraform, r#"(?m)^\s*(resource|provider|variable|module)\s+"[^"]+""#),
            (Language::Go, r"(?m)^package\s+\w+\s*$[\s\S]*\bfunc\s"),
            (Language::CSharp, r"(?m)^\s*using\s+System(\.\w+)*\s*;|\bnamespace\s+[\w.]+\s*\{"),
            (Language::Java, r"(?m)^\s*import\s+(java|javax|com\.google)\.[\w.*]+\s*;|\bpublic\s+(final\s+)?class\s+\w+"),
            (Language::Rust, r"(?m)^\s*use\s+\w+(::\w+)+|\bfn\s+main\s*\(\)|\blet\s+mut\s"),
            (Language::Cpp, r"(?m)^\s*#include\s*[<\x22]|\bstd::"),
            (Language::Python, r"(?m)^\s*def\s+\w+\(.*\)\s*(->\s*[^:]+)?:|^\s*from\s+[\w.]+\s+import\s|^\s*import\s+[\w.]+\s*$"),
            (Language::Ruby, r#"(?m)^\s*require\s+['"]|^\s*puts\s|^\s*end\s*$"#),
            (Language::JavaScript, r"\brequire\(|\bconsole\.log\(|(?m)^\s*(const|let)\s+\w+\s*=|=>"),
        ]
        .into_iter()
        .filter_map(|(language, pattern)| Regex::new(pattern).ok().map(|re| (language, re)))
        .collect()
    })
}

fn language_from_content(code: &str) -> Language {
    signatures()
        .iter()
        .find(|(_, re)| re.is_match(code))
        .map(|(language, _)| *language)
        .unwrap_or(Language::Unknown)
}

/// File extension of the provenance URL when it is in the extension table,
/// otherwise content signatures, otherwise `Unknown`.
pub fn detect_language(provenance_url: Option<&str>, code: &str) -> Language {
    provenance_url
        .filter(|url| !url.trim().is_empty())
        .and_then(language_from_url)
        .unwrap_or_else(|| language_from_content(code))
}

fn region_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\[(?:START|END)\s+([a-zA-Z0-9_]+)\]").expect("static region-tag regex")
    })
}

/// Every `[START name]` / `[END name]` identifier, unique and sorted.
pub fn extract_region_tags(code: &str) -> Vec<String> {
    region_tag_re()
        .captures_iter(code)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[derive(Debug, Clone, Copy)]
enum CommentStyle {
    Hash,
    CFamily,
    Markup,
    None,
}

struct CommentPatterns {
    hash: Regex,
    line: Regex,
    block: Regex,
    markup: Regex,
}

fn comment_patterns() -> &'static CommentPatterns {
    static PATTERNS: OnceLock<CommentPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| CommentPatterns {
        hash: Regex::new(r"#.*").expect("static hash-comment regex"),
        line: Regex::new(r"//.*").expect("static line-comment regex"),
        block: Regex::new(r"(?s)/\*.*?\*/").expect("static block-comment regex"),
        markup: Regex::new(r"(?s)<!--.*?-->").expect("static markup-comment regex"),
    })
}

/// Remove comments by language family. Unknown languages come back unchanged.
///
/// Comment markers inside string literals are not recognized.
pub fn strip_comments(code: &str, language: Language) -> String {
    let patterns = comment_patterns();
    match language.comment_style() {
        CommentStyle::Hash => patterns.hash.replace_all(code, "").into_owned(),
        CommentStyle::CFamily => {
            let without_line = patterns.line.replace_all(code, "");
            patterns.block.replace_all(&without_line, "").into_owned()
        }
        CommentStyle::Markup => patterns.markup.replace_all(code, "").into_owned(),
        CommentStyle::None => code.to_string(),
    }
}

/// Gates applied before any generation call.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrecheckConfig {
    pub require_region_tags: bool,
    pub restrict_languages: bool,
}

/// Language and region tags of one sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub language: Language,
    pub region_tags: Vec<String>,
}

impl Detection {
    pub fn precheck(&self, config: &PrecheckConfig) -> Result<()> {
        if config.require_region_tags && self.region_tags.is_empty() {
            bail!("No region tags");
        }
        if config.restrict_languages && !self.language.is_supported() {
            bail!("Unsupported language: {}", self.language);
        }
        Ok(())
    }
}

/// Run language detection and region-tag extraction concurrently.
///
/// A sub-step that fails yields `Unknown` or an empty tag list.
pub async fn detect(code: Arc<str>, provenance_url: Option<Arc<str>>) -> Detection {
    let language_code = Arc::clone(&code);
    let language_task = tokio::task::spawn_blocking(move || {
        detect_language(provenance_url.as_deref(), &language_code)
    });
    let tags_task = tokio::task::spawn_blocking(move || extract_region_tags(&code));

    let (language, region_tags) = tokio::join!(language_task, tags_task);
    Detection {
        language: settle("language detection", language, Language::Unknown),
        region_tags: settle("region tag extraction", region_tags, Vec::new()),
    }
}

fn settle<T>(step: &'static str, joined: Result<T, JoinError>, fallback: T) -> T {
    joined.unwrap_or_else(|err| {
        tracing::warn!(step, error = %err, "detection step failed");
        fallback
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_from_extension() {
        let cases = [
            ("https://github.com/o/r/blob/main/snippets/quickstart.py", Language::Python),
            ("https://github.com/o/r/blob/main/App.kt", Language::Java),
            ("https://github.com/o/r/blob/main/main.go?plain=1", Language::Go),
            ("https://github.com/o/r/blob/main/index.TSX", Language::JavaScript),
            ("https://github.com/o/r/blob/main/main.tf#L10", Language::Terraform),
            ("https://github.com/o/r/blob/main/Program.cs", Language::CSharp),
            ("https://github.com/o/r/blob/main/a.hpp", Language::Cpp),
        ];
        for (url, expected) in cases {
            assert_eq!(detect_language(Some(url), ""), expected, "{url}");
        }
    }

    #[test]
    fn test_unmapped_extension_falls_back_to_content() {
        let code = "import os\n\ndef main():\n    print(os.getcwd())\n";
        assert_eq!(detect_language(Some("https://x.test/run.txt"), code), Language::Python);
        assert_eq!(detect_language(Some("https://x.test/README"), code), Language::Python);
        assert_eq!(detect_language(None, code), Language::Python);
        assert_eq!(detect_language(Some(""), "just prose"), Language::Unknown);
    }

    #[test]
    fn test_non_code_extensions_are_unknown() {
        let code = "import os\n\ndef main():\n    print(os.getcwd())\n";
        for url in [
            "https://x.test/run.sh",
            "https://x.test/app.yaml",
            "https://x.test/pom.XML",
        ] {
            assert_eq!(detect_language(Some(url), code), Language::Unknown, "{url}");
        }
    }

    #[tokio::test]
    async fn test_failed_step_falls_back() {
        let crashed =
            tokio::task::spawn_blocking(|| -> Language { panic!("detector crashed") }).await;
        assert!(crashed.is_err());
        assert_eq!(
            settle("language detection", crashed, Language::Unknown),
            Language::Unknown
        );

        let crashed =
            tokio::task::spawn_blocking(|| -> Vec<String> { panic!("extractor crashed") }).await;
        assert!(settle("region tag extraction", crashed, Vec::new()).is_empty());

        let ok = tokio::task::spawn_blocking(|| Language::Go).await;
        assert_eq!(settle("language detection", ok, Language::Unknown), Language::Go);
    }

    #[test]
    fn test_content_signatures() {
        assert_eq!(language_from_content("<?php echo 'x';"), Language::Php);
        assert_eq!(
            language_from_content("package main\n\nimport \"fmt\"\n\nfunc main() {}\n"),
            Language::Go
        );
        assert_eq!(
            language_from_content(
                "import com.google.cloud.storage.Storage;\npublic class Quickstart {}"
            ),
            Language::Java
        );
        assert_eq!(
            language_from_content("using System;\nnamespace Demo { }"),
            Language::CSharp
        );
        assert_eq!(
            language_from_content("const x = require('fs');\nconsole.log(x);"),
            Language::JavaScript
        );
        assert_eq!(
            language_from_content("resource \"google_storage_bucket\" \"b\" {}"),
            Language::Terraform
        );
    }

    #[test]
    fn test_region_tags_unique_and_sorted() {
        let code = "# [START zeta_tag]\nx = 1\n# [END zeta_tag]\n# [START alpha_tag]\n# [END alpha_tag]\n[START bad-tag]";
        assert_eq!(extract_region_tags(code), vec!["alpha_tag", "zeta_tag"]);
        assert!(extract_region_tags("no tags here").is_empty());
    }

    #[test]
    fn test_strip_comments_by_family() {
        assert_eq!(strip_comments("x = 1  # note\n", Language::Python), "x = 1  \n");
        assert_eq!(
            strip_comments("int a; // tail\n/* block\n spans */int b;", Language::Java),
            "int a; \nint b;"
        );
        assert_eq!(strip_comments("<a/><!-- c\n -->", Language::Xml), "<a/>");
        assert_eq!(strip_comments("# kept", Language::Unknown), "# kept");
    }

    #[test]
    fn test_precheck_gates() {
        let detection = Detection {
            language: Language::Rust,
            region_tags: Vec::new(),
        };
        assert!(detection.precheck(&PrecheckConfig::default()).is_ok());

        let err = detection
            .precheck(&PrecheckConfig {
                require_region_tags: true,
                restrict_languages: false,
            })
            .unwrap_err();
        assert_eq!(err.to_string(), "No region tags");

        let err = detection
            .precheck(&PrecheckConfig {
                require_region_tags: false,
                restrict_languages: true,
            })
            .unwrap_err();
        assert!(err.to_string().contains("Unsupported language: Rust"));
    }

    #[tokio::test]
    async fn test_detect_joins_both_steps() {
        let code: Arc<str> = Arc::from("# [START b]\n# [START a]\nimport os\n");
        let detection = detect(code, Some(Arc::from("https://x.test/s.py"))).await;
        assert_eq!(detection.language, Language::Python);
        assert_eq!(detection.region_tags, vec!["a", "b"]);
    }
}
