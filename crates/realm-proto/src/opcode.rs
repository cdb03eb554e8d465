//! Bidirectional mapping between wire opcodes and symbolic names.
//!
//! The catalog is a static table, seeded with a representative set of
//! auth/realm/world symbols (handshake, keep-alive, quest lifecycle, chat,
//! movement) standing in for the full data-driven table a live deployment
//! would load; exhaustive opcode semantics are out of scope here.

pub type Opcode = u16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Symbol {
    ServerHello,
    EncryptionHandshake,
    ClientHelloAuth,
    ClientHelloRealm,
    AuthResult,
    RealmList,
    Keepalive,
    Disconnect,
    QuestAccept,
    QuestProgressUpdate,
    QuestComplete,
    QuestAbandon,
    Chat,
    MoveUpdate,
}

struct Entry {
    opcode: Opcode,
    symbol: Symbol,
    name: &'static str,
}

static CATALOG: &[Entry] = &[
    Entry { opcode: 0x0003, symbol: Symbol::ServerHello, name: "ServerHello" },
    Entry { opcode: 0x000A, symbol: Symbol::EncryptionHandshake, name: "EncryptionHandshake" },
    Entry { opcode: 0x0004, symbol: Symbol::ClientHelloAuth, name: "ClientHelloAuth" },
    Entry { opcode: 0x0005, symbol: Symbol::ClientHelloRealm, name: "ClientHelloRealm" },
    Entry { opcode: 0x0006, symbol: Symbol::AuthResult, name: "AuthResult" },
    Entry { opcode: 0x0007, symbol: Symbol::RealmList, name: "RealmList" },
    Entry { opcode: 0x0008, symbol: Symbol::Keepalive, name: "Keepalive" },
    Entry { opcode: 0x0009, symbol: Symbol::Disconnect, name: "Disconnect" },
    Entry { opcode: 0x0100, symbol: Symbol::QuestAccept, name: "QuestAccept" },
    Entry { opcode: 0x0101, symbol: Symbol::QuestProgressUpdate, name: "QuestProgressUpdate" },
    Entry { opcode: 0x0102, symbol: Symbol::QuestComplete, name: "QuestComplete" },
    Entry { opcode: 0x0103, symbol: Symbol::QuestAbandon, name: "QuestAbandon" },
    Entry { opcode: 0x0200, symbol: Symbol::Chat, name: "Chat" },
    Entry { opcode: 0x0201, symbol: Symbol::MoveUpdate, name: "MoveUpdate" },
];

/// Looks up the wire opcode for a symbol. Panics if `symbol` is missing from
/// the catalog, which can only happen if the static table above is edited
/// inconsistently (every `Symbol` variant must have exactly one entry).
pub fn to_wire(symbol: Symbol) -> Opcode {
    CATALOG
        .iter()
        .find(|e| e.symbol == symbol)
        .map(|e| e.opcode)
        .unwrap_or_else(|| panic!("opcode catalog missing entry for {symbol:?}"))
}

/// Looks up the symbol for a wire opcode, if the catalog knows it.
pub fn from_wire(opcode: Opcode) -> Option<Symbol> {
    CATALOG.iter().find(|e| e.opcode == opcode).map(|e| e.symbol)
}

/// Human-readable name for logging; falls back to the raw hex value for
/// opcodes the catalog doesn't recognize.
pub fn display_name(opcode: Opcode) -> String {
    match CATALOG.iter().find(|e| e.opcode == opcode) {
        Some(e) => e.name.to_string(),
        None => format!("unknown(0x{opcode:04x})"),
    }
}
