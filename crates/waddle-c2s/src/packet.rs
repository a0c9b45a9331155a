//! Stanzas exchanged over a session.

use minidom::Element;
use xmpp_parsers::iq::Iq;
use xmpp_parsers::message::Message;
use xmpp_parsers::presence::Presence;

use crate::error::{C2sError, StreamErrorCondition};
use crate::parser::element_to_string;

/// A complete, already validated stanza.
///
/// Sessions forward packets untouched in both directions.
#[derive(Debug, Clone)]
pub enum Packet {
    Message(Message),
    Presence(Presence),
    Iq(Iq),
}

impl Packet {
    /// Get the stanza type name for tracing.
    pub fn name(&self) -> &'static str {
        match self {
            Packet::Message(_) => "message",
            Packet::Presence(_) => "presence",
            Packet::Iq(_) => "iq",
        }
    }

    /// Serialize the packet for the wire.
    pub fn to_xml(&self) -> Result<String, C2sError> {
        element_to_string(&Element::from(self.clone()))
    }
}

impl From<Packet> for Element {
    fn from(packet: Packet) -> Self {
        match packet {
            Packet::Message(msg) => msg.into(),
            Packet::Presence(pres) => pres.into(),
            Packet::Iq(iq) => iq.into(),
        }
    }
}

impl TryFrom<Element> for Packet {
    type Error = C2sError;

    fn try_from(element: Element) -> Result<Self, Self::Error> {
        let invalid = |kind: &str, e: &dyn std::fmt::Debug| {
            C2sError::protocol(
                StreamErrorCondition::InvalidXml,
                format!("Invalid {}: {:?}", kind, e),
            )
        };

        let name = element.name().to_string();
        match name.as_str() {
            "message" => Message::try_from(element)
                .map(Packet::Message)
                .map_err(|e| invalid("message", &e)),
            "presence" => Presence::try_from(element)
                .map(Packet::Presence)
                .map_err(|e| invalid("presence", &e)),
            "iq" => Iq::try_from(element)
                .map(Packet::Iq)
                .map_err(|e| invalid("iq", &e)),
            other => Err(C2sError::protocol(
                StreamErrorCondition::UnsupportedStanzaType,
                format!("<{}> is not a stanza", other),
            )),
        }
    }
}

impl From<Message> for Packet {
    fn from(msg: Message) -> Self {
        Packet::Message(msg)
    }
}

impl From<Presence> for Packet {
    fn from(pres: Presence) -> Self {
        Packet::Presence(pres)
    }
}

impl From<Iq> for Packet {
    fn from(iq: Iq) -> Self {
        Packet::Iq(iq)
    }
}
