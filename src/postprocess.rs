//! Normalisation of translated fragments before they join a document.

use crate::language::TargetLanguage;
use pulldown_cmark::{html, Options, Parser};
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;

/// Leading paragraph a model sometimes adds in front of its translation
static INTRO_PARAGRAPH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)\A\s*<p>\s*(Aquí está|Voici la traduction|Here is the translation).*?</p>\s*")
        .expect("intro pattern is valid")
});

/// Markup and entities that must survive Latin-letter removal
static PROTECTED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<[^>]*>|&(?:[A-Za-z]+|#[0-9]+|#[xX][0-9A-Fa-f]+);")
        .expect("protected pattern is valid")
});

static LATIN_LETTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z]").expect("latin pattern is valid"));

/// How the caller says a fragment is encoded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FragmentFormat {
    Html,
    Markdown,
}

/// Translated content as declared by the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    /// Already HTML
    Html(String),
    /// Markdown or plain prose, rendered to HTML here
    Markdown(String),
}

impl Fragment {
    pub fn new(format: FragmentFormat, content: String) -> Self {
        match format {
            FragmentFormat::Html => Fragment::Html(content),
            FragmentFormat::Markdown => Fragment::Markdown(content),
        }
    }

    pub fn is_blank(&self) -> bool {
        match self {
            Fragment::Html(s) | Fragment::Markdown(s) => s.trim().is_empty(),
        }
    }
}

/// Turn a fragment into the HTML stored for its bundle
pub fn render_fragment(fragment: &Fragment, language: TargetLanguage) -> String {
    let html = match fragment {
        Fragment::Html(markup) => markup.trim().to_string(),
        Fragment::Markdown(text) => markdown_to_html(text.trim()),
    };

    let html = strip_intro(&html);

    if language == TargetLanguage::Arabic {
        strip_latin_letters(&html)
    } else {
        html
    }
}

fn markdown_to_html(text: &str) -> String {
    let parser = Parser::new_ext(text, Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH);
    let mut out = String::with_capacity(text.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

fn strip_intro(html: &str) -> String {
    INTRO_PARAGRAPH.replace(html, "").into_owned()
}

/// Remove Latin letters from text content, leaving tags and entities intact
fn strip_latin_letters(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut last = 0;
    for protected in PROTECTED.find_iter(html) {
        out.push_str(&LATIN_LETTER.replace_all(&html[last..protected.start()], ""));
        out.push_str(protected.as_str());
        last = protected.end();
    }
    out.push_str(&LATIN_LETTER.replace_all(&html[last..], ""));
    out
}
