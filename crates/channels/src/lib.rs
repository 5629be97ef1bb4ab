pub mod markup;
pub mod rate_limit;
pub mod transport;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use markup::{render, EmojiMap, FormattedText, FormattingSpan, SpanKind};
pub use rate_limit::OutboundLimiter;
pub use transport::{
    Button, ChatDetails, FullUser, InvitePreview, JoinOutcome, OutgoingMessage, Peer, PeerKind,
    PlatformMessage, SentMessage, Transport, TransportError, TransportResult,
};
