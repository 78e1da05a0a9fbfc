use super::quote_encode;

/// One `* LIST`/`* XLIST`/`* LSUB` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListItem {
    pub verb: &'static str,
    pub attributes: Vec<String>,
    pub name: String,
}

impl ListItem {
    pub fn new(verb: &'static str, name: impl Into<String>) -> Self {
        ListItem {
            verb,
            attributes: Vec::new(),
            name: name.into(),
        }
    }

    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attributes.push(attribute.into());
        self
    }

    pub fn with_children(mut self, has_children: bool) -> Self {
        self.attributes.push(
            if has_children {
                "\\HasChildren"
            } else {
                "\\HasNoChildren"
            }
            .to_string(),
        );
        self
    }

    pub fn serialize(&self) -> String {
        format!(
            "* {} ({}) \"/\" {}\r\n",
            self.verb,
            self.attributes.join(" "),
            if self.name == "INBOX" {
                "\"INBOX\"".to_string()
            } else {
                quote_encode(&self.name)
            }
        )
    }
}
