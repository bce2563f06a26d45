//! The invitation email.
//!
//! Output is a self-contained HTML document: inline styles only, no external
//! images, fonts or scripts. Every interpolated value is escaped.

use quick_xml::escape::escape;
use serde::{Deserialize, Serialize};

/// Everything the invitation needs. Carries the token, never the secret.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvitationContext {
  pub semester:   u8,
  /// Division name or override roster label.
  pub audience:   String,
  pub form_title: String,
  pub token:      String,
  /// Public origin of the feedback frontend, e.g. `https://feedback.example.edu`.
  pub base_url:   String,
}

impl InvitationContext {
  /// The link a recipient follows to open the form.
  pub fn access_link(&self) -> String {
    format!("{}/feedback/{}", self.base_url.trim_end_matches('/'), self.token)
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
  pub subject: String,
  pub html:    String,
}

pub fn render_invitation(ctx: &InvitationContext) -> RenderedEmail {
  let subject = format!("Feedback requested: {}", ctx.form_title);

  let title = escape(ctx.form_title.as_str());
  let audience = escape(ctx.audience.as_str());
  let access_link = ctx.access_link();
  let link = escape(access_link.as_str());
  let semester = ctx.semester;

  let html = format!(
    r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title}</title>
</head>
<body style="margin:0;padding:0;background:#f4f5f7;font-family:Arial,Helvetica,sans-serif;color:#1f2933;">
<table role="presentation" width="100%" cellspacing="0" cellpadding="0" style="padding:24px 0;">
<tr><td align="center">
<table role="presentation" width="560" cellspacing="0" cellpadding="0" style="background:#ffffff;border-radius:8px;padding:32px;">
<tr><td>
<h1 style="font-size:20px;margin:0 0 16px 0;">{title}</h1>
<p style="font-size:14px;line-height:1.6;margin:0 0 8px 0;">Semester {semester} &middot; {audience}</p>
<p style="font-size:14px;line-height:1.6;margin:0 0 24px 0;">Your feedback is anonymous. The link below is personal and can be used to submit one response.</p>
<p style="margin:0 0 24px 0;"><a href="{link}" style="display:inline-block;background:#2563eb;color:#ffffff;text-decoration:none;padding:12px 20px;border-radius:6px;font-size:14px;">Give feedback</a></p>
<p style="font-size:12px;line-height:1.6;color:#52606d;margin:0;">If the button does not work, copy this address into your browser:<br>{link}</p>
</td></tr>
</table>
</td></tr>
</table>
</body>
</html>
"#
  );

  RenderedEmail { subject, html }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn ctx() -> InvitationContext {
    InvitationContext {
      semester:   5,
      audience:   "CSE-A".into(),
      form_title: "Operating Systems".into(),
      token:      "abc_DEF-123".into(),
      base_url:   "https://feedback.example.edu/".into(),
    }
  }

  #[test]
  fn link_embeds_token_once_without_double_slash() {
    assert_eq!(
      ctx().access_link(),
      "https://feedback.example.edu/feedback/abc_DEF-123"
    );
  }

  #[test]
  fn body_carries_context() {
    let email = render_invitation(&ctx());
    assert_eq!(email.subject, "Feedback requested: Operating Systems");
    assert!(email.html.contains("Semester 5"));
    assert!(email.html.contains("CSE-A"));
    assert!(email.html.contains("https://feedback.example.edu/feedback/abc_DEF-123"));
  }

  #[test]
  fn body_is_self_contained() {
    let html = render_invitation(&ctx()).html;
    assert!(!html.contains("<img"));
    assert!(!html.contains("<script"));
    assert!(!html.contains("<link"));
  }

  #[test]
  fn interpolated_values_are_escaped() {
    let mut c = ctx();
    c.form_title = "<b>Networks</b> & \"Labs\"".into();
    let html = render_invitation(&c).html;
    assert!(html.contains("&lt;b&gt;Networks&lt;/b&gt; &amp; &quot;Labs&quot;"));
    assert!(!html.contains("<b>Networks"));
  }

  #[test]
  fn link_and_audience_are_escaped() {
    let mut c = ctx();
    c.audience = "Tom's <group>".into();
    c.base_url = "https://feedback.example.edu/?a=1&b=\"2\"".into();
    let html = render_invitation(&c).html;
    assert!(html.contains("Tom&apos;s &lt;group&gt;"));
    assert!(html.contains("href=\"https://feedback.example.edu/?a=1&amp;b=&quot;2&quot;/feedback/abc_DEF-123\""));
    assert!(!html.contains("<group>"));
  }
}
