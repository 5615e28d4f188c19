use crate::cycle::ZoningCommand;

pub const TOPIC_STATE_PREFIX: &str = "zoning/state/";
pub const TOPIC_STATE_ALL: &str = "zoning/state/#";

pub const TOPIC_CMD_PREFIX: &str = "zoning/cmnd/";
pub const TOPIC_CMD_AREA_TARGET_ALL: &str = "zoning/cmnd/area/+/target";

pub const TOPIC_CONTROLLER_STATE: &str = "zoning/controller/state";
pub const TOPIC_CONTROLLER_AREA_PREFIX: &str = "zoning/controller/area/";

pub fn state_topic(entity_id: &str) -> String {
    format!("{TOPIC_STATE_PREFIX}{entity_id}")
}

pub fn entity_from_state_topic(topic: &str) -> Option<&str> {
    topic
        .strip_prefix(TOPIC_STATE_PREFIX)
        .filter(|entity_id| !entity_id.is_empty() && !entity_id.contains('/'))
}

pub fn command_topic(command: &ZoningCommand) -> String {
    format!("{TOPIC_CMD_PREFIX}{}/{}", command.domain(), command.service())
}

pub fn area_target_topic(area: &str) -> String {
    format!("{TOPIC_CMD_PREFIX}area/{area}/target")
}

pub fn area_from_target_topic(topic: &str) -> Option<&str> {
    topic
        .strip_prefix(TOPIC_CMD_PREFIX)?
        .strip_prefix("area/")?
        .strip_suffix("/target")
        .filter(|area| !area.is_empty() && !area.contains('/'))
}

pub fn controller_area_topic(area: &str) -> String {
    format!("{TOPIC_CONTROLLER_AREA_PREFIX}{area}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_topics_carry_entity_ids() {
        let topic = state_topic("sensor.office_temperature");

        assert_eq!(topic, "zoning/state/sensor.office_temperature");
        assert_eq!(entity_from_state_topic(&topic), Some("sensor.office_temperature"));
        assert_eq!(entity_from_state_topic("zoning/state/"), None);
        assert_eq!(entity_from_state_topic("zoning/state/a/b"), None);
        assert_eq!(entity_from_state_topic("other/sensor.x"), None);
    }

    #[test]
    fn command_topics_follow_domain_and_service() {
        let command = ZoningCommand::CloseCover {
            entity_id: "cover.office_vent".to_string(),
        };

        assert_eq!(command_topic(&command), "zoning/cmnd/cover/close_cover");
    }

    #[test]
    fn area_target_topics_round_trip_names() {
        assert_eq!(
            area_from_target_topic(&area_target_topic("master_bedroom")),
            Some("master_bedroom")
        );
        assert_eq!(area_from_target_topic("zoning/cmnd/area//target"), None);
        assert_eq!(area_from_target_topic("zoning/cmnd/cover/open_cover"), None);
    }
}
