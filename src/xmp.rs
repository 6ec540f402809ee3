//! Minimal XMP packet generation for the catalog `/Metadata` stream.

use crate::document::DocumentInfo;

/// Renders an XMP packet carrying the document info. Attach it with
/// [`crate::Document::set_xmp_metadata`].
pub fn xmp_packet(info: &DocumentInfo) -> String {
    let mut out = String::with_capacity(1024);
    out.push_str("<?xpacket begin=\"\u{FEFF}\" id=\"W5M0MpCehiHzreSzNTczkc9d\"?>\n");
    out.push_str("<x:xmpmeta xmlns:x=\"adobe:ns:meta/\">\n");
    out.push_str("<rdf:RDF xmlns:rdf=\"http://www.w3.org/1999/02/22-rdf-syntax-ns#\">\n");
    out.push_str("<rdf:Description rdf:about=\"\"\n");
    out.push_str("  xmlns:dc=\"http://purl.org/dc/elements/1.1/\"\n");
    out.push_str("  xmlns:pdf=\"http://ns.adobe.com/pdf/1.3/\"\n");
    out.push_str("  xmlns:xmp=\"http://ns.adobe.com/xap/1.0/\">\n");
    if !info.title.is_empty() {
        out.push_str(&format!(
            "<dc:title><rdf:Alt><rdf:li xml:lang=\"x-default\">{}</rdf:li></rdf:Alt></dc:title>\n",
            escape_xml(&info.title)
        ));
    }
    if !info.author.is_empty() {
        out.push_str(&format!(
            "<dc:creator><rdf:Seq><rdf:li>{}</rdf:li></rdf:Seq></dc:creator>\n",
            escape_xml(&info.author)
        ));
    }
    if !info.subject.is_empty() {
        out.push_str(&format!(
            "<dc:description><rdf:Alt><rdf:li xml:lang=\"x-default\">{}</rdf:li></rdf:Alt></dc:description>\n",
            escape_xml(&info.subject)
        ));
    }
    if !info.producer.is_empty() {
        out.push_str(&format!(
            "<pdf:Producer>{}</pdf:Producer>\n",
            escape_xml(&info.producer)
        ));
    }
    if !info.keywords.is_empty() {
        out.push_str(&format!(
            "<pdf:Keywords>{}</pdf:Keywords>\n",
            escape_xml(&info.keywords.join(","))
        ));
    }
    if !info.creator.is_empty() {
        out.push_str(&format!(
            "<xmp:CreatorTool>{}</xmp:CreatorTool>\n",
            escape_xml(&info.creator)
        ));
    }
    out.push_str("</rdf:Description>\n</rdf:RDF>\n</x:xmpmeta>\n");
    out.push_str("<?xpacket end=\"w\"?>\n");
    out
}

fn escape_xml(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '<' => "&lt;".to_string(),
            '>' => "&gt;".to_string(),
            '&' => "&amp;".to_string(),
            '"' => "&quot;".to_string(),
            other => other.to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_contains_escaped_title() {
        let info = DocumentInfo {
            title: "a <b> & c".to_string(),
            ..DocumentInfo::default()
        };
        let xmp = xmp_packet(&info);
        assert!(xmp.contains("a &lt;b&gt; &amp; c"));
        assert!(xmp.starts_with("<?xpacket"));
        assert!(xmp.trim_end().ends_with("<?xpacket end=\"w\"?>"));
    }
}
