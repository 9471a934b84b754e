//! An application object composed of mutable sub-objects whose ids derive
//! from the parent's id, so every peer computes the same hashes.

use std::sync::Arc;

use hashspace_core::literal::{FieldReader, FieldWriter, References};
use hashspace_core::model::{expect_class, Identity, Keyring, ObjectHeader};
use hashspace_core::{
    deliteralize, literalize, HashedObject, HashspaceError, KnownObject, MutableSet, Result, Store,
};

const CHAT_ROOM_CLASS: &str = "test/ChatRoom";

#[derive(Debug, Clone)]
struct ChatRoom {
    header: ObjectHeader,
    participants: MutableSet<Identity>,
    messages: MutableSet<String>,
}

impl ChatRoom {
    fn new(topic: &str) -> Result<Self> {
        let mut room = Self {
            header: ObjectHeader::new(),
            participants: MutableSet::new(),
            messages: MutableSet::new(),
        };
        room.set_id(topic);
        room.participants = room.add_derived_field("participants", MutableSet::new())?;
        room.messages = room.add_derived_field("messages", MutableSet::new())?;
        Ok(room)
    }
}

impl HashedObject for ChatRoom {
    fn class_name(&self) -> &'static str {
        CHAT_ROOM_CLASS
    }

    fn header(&self) -> &ObjectHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut ObjectHeader {
        &mut self.header
    }

    fn write_fields(&self, fields: &mut FieldWriter<'_, '_>) -> Result<()> {
        fields.put("participants", &self.participants)?;
        fields.put("messages", &self.messages)
    }

    fn read_fields(class_name: &str, fields: &mut FieldReader<'_, '_>) -> Result<Self> {
        expect_class(class_name, CHAT_ROOM_CLASS)?;
        Ok(Self {
            header: ObjectHeader::new(),
            participants: fields.get("participants")?,
            messages: fields.get("messages")?,
        })
    }

    fn validate(&self, _references: &References<'_>) -> bool {
        self.check_derived_field("participants", &self.participants)
            && self.check_derived_field("messages", &self.messages)
    }
}

#[test]
fn test_rooms_with_the_same_topic_agree() {
    let a = ChatRoom::new("rust").unwrap();
    let b = ChatRoom::new("rust").unwrap();
    let c = ChatRoom::new("go").unwrap();

    assert_eq!(a.hash(), b.hash());
    assert_eq!(a.messages.hash(), b.messages.hash());
    assert_ne!(a.hash(), c.hash());
    assert_ne!(a.messages.hash(), c.messages.hash());
    assert_ne!(a.messages.id(), a.participants.id());
}

#[test]
fn test_room_without_derived_ids_fails_validation() {
    let mut room = ChatRoom::new("rust").unwrap();
    room.messages.set_id("chosen by hand");
    let context = literalize(&room).unwrap();
    let err = deliteralize::<ChatRoom>(&room.hash(), &context).unwrap_err();
    assert!(matches!(err, HashspaceError::ValidationFailed(_)));

    let mut orphan = ChatRoom::new("rust").unwrap();
    orphan.header_mut().set_id(None);
    assert!(orphan.add_derived_field("messages", MutableSet::<String>::new()).is_err());
}

#[tokio::test]
async fn test_room_contents_travel_through_the_store() {
    let keyring = Arc::new(Keyring::new());
    let store = Store::in_memory(keyring.clone());
    let alice = keyring.generate(Some("alice"));

    let mut room = ChatRoom::new("rust").unwrap();
    let hash = store.save(&mut room).await.unwrap();
    room.participants.add(alice.clone(), None).unwrap();
    room.messages.add("hello".to_string(), None).unwrap();
    room.messages.add("anyone here?".to_string(), None).unwrap();
    store.save_mutable(&mut room.participants).await.unwrap();
    store.save_mutable(&mut room.messages).await.unwrap();

    let mut joined: ChatRoom = store.load(&hash).await.unwrap().unwrap();
    store.load_all_changes(&mut joined.participants).await.unwrap();
    store.load_all_changes(&mut joined.messages).await.unwrap();
    assert!(joined.participants.has(&alice));
    assert_eq!(joined.messages.len(), 2);

    // sub-objects are known classes, the room is not
    let messages = store.load_any(&room.messages.hash()).await.unwrap();
    assert!(matches!(messages, Some(KnownObject::MutableSet(_))));
    let err = store.load_any(&hash).await.unwrap_err();
    assert!(matches!(err, HashspaceError::UnknownClass(_)));
}
