use super::session::DocumentId;
use crate::language::TargetLanguage;
use pulldown_cmark_escape::escape_html;
use std::collections::BTreeMap;
use std::fmt::{self, Write};

/// One standalone HTML document with a `<section>` per bundle, in index order
pub fn render_document(
    id: &DocumentId,
    language: TargetLanguage,
    sections: &BTreeMap<u32, Vec<String>>,
) -> String {
    let body_len: usize = sections.values().flatten().map(String::len).sum();
    let mut out = String::with_capacity(body_len + 256 + sections.len() * 48);

    // Writing into a String cannot fail
    write_document(&mut out, id, language, sections).ok();
    out
}

fn write_document(
    out: &mut String,
    id: &DocumentId,
    language: TargetLanguage,
    sections: &BTreeMap<u32, Vec<String>>,
) -> fmt::Result {
    writeln!(
        out,
        "<!DOCTYPE html>\n<html lang=\"{}\" dir=\"{}\">\n<head>\n<meta charset=\"utf-8\">",
        language.code(),
        language.direction().as_str()
    )?;
    out.push_str("<title>");
    escape_html(&mut *out, id.as_str())?;
    out.push_str("</title>\n</head>\n<body>\n");

    for (index, fragments) in sections {
        writeln!(out, "<section class=\"bundle\" data-bundle=\"{}\">", index)?;
        for fragment in fragments {
            out.push_str(fragment);
            if !fragment.ends_with('\n') {
                out.push('\n');
            }
        }
        out.push_str("</section>\n");
    }

    out.push_str("</body>\n</html>\n");
    Ok(())
}
