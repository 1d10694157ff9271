use crate::security::csp::POLICY;
use crate::security::csrf::CSRF_FIELD;
use crate::types::FORM_FIELDS;

const LABELS: [&str; 6] = [
    "Temperature (°C)",
    "Humidity (%)",
    "Dew point temperature (°C)",
    "Wind speed (m/s)",
    "Rainfall (mm)",
    "Hour (0-23)",
];

pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

fn layout(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<meta http-equiv="Content-Security-Policy" content="{csp}">
<title>{title}</title>
</head>
<body>
<nav><a href="/">Predict</a> | <a href="/privacy.html">Privacy</a></nav>
<main>
{body}
</main>
</body>
</html>
"#,
        // Browsers ignore frame-ancestors and report-uri in <meta>.
        csp = escape(POLICY),
        title = escape(title),
        body = body,
    )
}

pub fn index(result: Option<i64>, flashes: &[&str], csrf_token: &str) -> String {
    let mut body = String::from("<h1>Weather-based prediction</h1>\n");

    for msg in flashes {
        body.push_str(&format!(
            "<p class=\"flash error\" role=\"alert\">{}</p>\n",
            escape(msg)
        ));
    }

    body.push_str("<form method=\"post\" action=\"/\">\n");
    body.push_str(&format!(
        "<input type=\"hidden\" name=\"{}\" value=\"{}\">\n",
        CSRF_FIELD,
        escape(csrf_token)
    ));
    for (name, label) in FORM_FIELDS.iter().zip(LABELS) {
        let step = if *name == "Hour" { "1" } else { "any" };
        body.push_str(&format!(
            "<label for=\"{name}\">{label}</label>\n\
             <input type=\"number\" step=\"{step}\" id=\"{name}\" name=\"{name}\" required>\n",
        ));
    }
    body.push_str("<button type=\"submit\">Predict</button>\n</form>\n");

    if let Some(value) = result {
        body.push_str(&format!(
            "<section id=\"result\"><h2>Prediction</h2><p><output>{}</output></p></section>\n",
            value
        ));
    }

    layout("Prediction", &body)
}

pub fn privacy() -> String {
    layout(
        "Privacy policy",
        "<h1>Privacy policy</h1>\n\
         <p>Values entered in the prediction form are used only to compute a single \
         prediction and are not stored.</p>\n\
         <p>A security log records prediction results, client addresses that exceed \
         the request rate limit, failed CSRF checks, and Content-Security-Policy \
         violation reports sent by your browser.</p>\n\
         <p>One cookie is set: a CSRF token that protects form submissions. It \
         carries no personal data and expires after an hour.</p>\n",
    )
}
