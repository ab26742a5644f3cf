use chrono::Utc;
use common::domain::{Device, Group, GroupType, InboxEntry, InboxStatus, Message, MessageType, Owner};
use common::geo::GeoPoint;
use common::nid::Nid;
use serde_json::{json, Value};

pub fn group(group_id: i64, group_type: GroupType) -> Group {
    Group {
        group_id,
        group_type,
        nid: None,
        radius_km: None,
        description: group_type.default_description().to_string(),
        created_at: Some(Utc::now()),
    }
}

pub fn owner(owner_id: i64) -> Owner {
    Owner {
        owner_id,
        email: format!("owner{}@example.com", owner_id),
        nid: None,
        radius_km: None,
        active: true,
    }
}

pub fn device(device_id: i64, group_id: i64) -> Device {
    Device {
        device_id,
        hardware_id: format!("hw-{:03}", device_id),
        owner_id: 1,
        group_id,
        nid: None,
        location: None,
        webhook_url: None,
        retry_limit: 3,
        active: true,
        created_at: Some(Utc::now()),
        updated_at: Some(Utc::now()),
    }
}

pub fn with_nid(mut device: Device, raw: &str) -> Device {
    device.nid = Some(Nid::parse(raw).unwrap());
    device
}

pub fn at(mut device: Device, lat: f64, lon: f64) -> Device {
    device.location = Some(GeoPoint::new(lat, lon).unwrap());
    device
}

pub fn with_webhook(mut device: Device) -> Device {
    device.webhook_url = Some(format!("https://hooks.example.com/{}", device.hardware_id));
    device
}

pub fn message(message_id: i64, message_type: MessageType, source_device_id: i64, payload: Value) -> Message {
    Message {
        message_id,
        message_type,
        alert_type: None,
        alarm_type: None,
        payload,
        source_device_id,
        user: None,
        bcname: None,
        recipient: None,
        contact: None,
        created_at: Utc::now(),
        read: false,
        last_read_at: None,
        last_modified_read: None,
        acknowledge_status: None,
    }
}

pub fn alert(message_id: i64, source_device_id: i64) -> Message {
    message(message_id, MessageType::Alert, source_device_id, json!({}))
}

pub fn inbox_entry(inbox_id: i64, device_id: i64, message_id: i64) -> InboxEntry {
    InboxEntry {
        inbox_id,
        device_id,
        message_id,
        status: InboxStatus::Pending,
        delivery_attempts: 0,
        created_at: Utc::now(),
        delivered_at: None,
        acknowledged_at: None,
    }
}
