//! Twilio-style WhatsApp webhook: form fields in, TwiML out.

use std::collections::HashMap;

use oficina_core::{Attachment, BotReply, InboundMessage, ReplySegment};

/// Twilio delivers at most ten media items per message.
const MAX_MEDIA_FIELDS: usize = 10;

pub fn inbound_from_form(form: &HashMap<String, String>) -> InboundMessage {
    let num_media = form
        .get("NumMedia")
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(0)
        .min(MAX_MEDIA_FIELDS);

    let attachments = (0..num_media)
        .filter_map(|idx| {
            let url = form.get(&format!("MediaUrl{idx}"))?.trim();
            if url.is_empty() {
                return None;
            }
            Some(Attachment {
                url: url.to_string(),
                content_type: form
                    .get(&format!("MediaContentType{idx}"))
                    .cloned()
                    .unwrap_or_default(),
            })
        })
        .collect();

    InboundMessage {
        sender: form
            .get("From")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty()),
        text: form.get("Body").cloned().unwrap_or_default(),
        attachments,
    }
}

pub fn render_twiml(reply: &BotReply) -> String {
    let mut out = String::from(r#"<?xml version="1.0" encoding="UTF-8"?><Response>"#);
    for segment in &reply.segments {
        match segment {
            ReplySegment::Text { body } => {
                out.push_str("<Message><Body>");
                out.push_str(&escape_xml(body));
                out.push_str("</Body></Message>");
            }
            ReplySegment::Media { url } => {
                out.push_str("<Message><Media>");
                out.push_str(&escape_xml(url));
                out.push_str("</Media></Message>");
            }
        }
    }
    out.push_str("</Response>");
    out
}

fn escape_xml(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn reads_sender_body_and_media() {
        let message = inbound_from_form(&form(&[
            ("From", "whatsapp:+5511999990000"),
            ("Body", "troca de correia hyster"),
            ("NumMedia", "2"),
            ("MediaUrl0", "https://api.twilio.com/media/0"),
            ("MediaContentType0", "image/jpeg"),
            ("MediaUrl1", "https://api.twilio.com/media/1"),
            ("MediaContentType1", "audio/ogg"),
        ]));

        assert_eq!(message.sender.as_deref(), Some("whatsapp:+5511999990000"));
        assert_eq!(message.attachments.len(), 2);
        assert_eq!(message.image_urls(), vec!["https://api.twilio.com/media/0"]);
    }

    #[test]
    fn missing_fields_mean_empty_message() {
        let message = inbound_from_form(&HashMap::new());
        assert!(message.sender.is_none());
        assert!(message.text.is_empty());
        assert!(message.attachments.is_empty());
    }

    #[test]
    fn renders_text_then_media_escaped() {
        let reply = BotReply::text("Óleo & filtro <ok>").with_media(["https://m/1.jpg?a=1&b=2"]);
        assert_eq!(
            render_twiml(&reply),
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response>\
             <Message><Body>Óleo &amp; filtro &lt;ok&gt;</Body></Message>\
             <Message><Media>https://m/1.jpg?a=1&amp;b=2</Media></Message>\
             </Response>"
        );
    }
}
