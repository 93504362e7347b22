mod common;

use common::{create_user, date, test_store};
use logsphere::models::{LogStatus, Role, Team};
use logsphere::services::{
    ApprovalService, LogService, NewActivity, NewLog, NotificationService, TeamService,
    UserService,
};

#[tokio::test]
async fn week_three_goes_back_to_the_guide_after_revision() {
    let store = test_store().await;
    let lead = create_user(&store, "Lena Lead", Role::TeamLead).await;
    let student = create_user(&store, "Sam Student", Role::Student).await;
    let guide = create_user(&store, "Gil Guide", Role::Guide).await;

    let team = Team::new(
        "ABCDEF".to_string(),
        lead.id.clone(),
        "ABCDEF-X7K2QP".to_string(),
        "ABCDEF-G-X7K2QP".to_string(),
    );
    store.insert(&team).await.unwrap();

    let joined = TeamService::join_team_by_code(&store, "ABCDEF-X7K2QP", &student.id)
        .await
        .unwrap();
    assert_eq!(joined.team_id, team.id);
    TeamService::join_team_by_code(&store, "ABCDEF-G-X7K2QP", &guide.id)
        .await
        .unwrap();

    let team = TeamService::get_team(&store, &team.id).await.unwrap();
    assert_eq!(team.member_ids, vec![student.id.clone()]);
    let student = UserService::get(&store, &student.id).await.unwrap();
    assert!(student.belongs_to(&team.id));

    let log = LogService::create_log(
        &store,
        NewLog {
            team_id: team.id.clone(),
            week_number: 3,
            start_date: date(2025, 4, 7),
            end_date: date(2025, 4, 13),
            activities: vec![NewActivity {
                date: date(2025, 4, 10),
                hours: 3.0,
                description: "field test".to_string(),
            }],
            created_by: student.id.clone(),
            created_by_name: student.name.clone(),
        },
    )
    .await
    .unwrap();
    assert_eq!(log.status, LogStatus::Draft);

    let log = ApprovalService::submit(&store, &log.id, &student).await.unwrap();
    assert_eq!(log.status, LogStatus::PendingLead);

    let log = ApprovalService::transition(&store, &log.id, &lead, LogStatus::PendingGuide, None)
        .await
        .unwrap();
    assert_eq!(log.status, LogStatus::PendingGuide);

    let guide = UserService::get(&store, &guide.id).await.unwrap();
    let log = ApprovalService::transition(
        &store,
        &log.id,
        &guide,
        LogStatus::NeedsRevision,
        Some("add more detail"),
    )
    .await
    .unwrap();
    assert_eq!(log.status, LogStatus::NeedsRevision);

    let inbox = NotificationService::list_for_user(&store, &student.id).await.unwrap();
    assert_eq!(inbox.len(), 1);
    assert!(!inbox[0].read);

    let log = ApprovalService::submit(&store, &log.id, &student).await.unwrap();
    assert_eq!(log.status, LogStatus::PendingGuide);
}
