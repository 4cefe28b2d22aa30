// SPDX-FileCopyrightText: 2026 Kindera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Static entity catalogue: the closed set of business-data categories the
//! assistant can operate on, with field schemas used to validate tool
//! parameters. Immutable, shared read-only after process start.

use kindera_core::FieldSpec;

/// Bumped whenever descriptors change; part of every cache fingerprint so
/// stale selection decisions age out with the catalogue.
pub const CATALOG_VERSION: &str = "2026-08";

/// A field schema entry in the static catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub field_type: &'static str,
    pub description: &'static str,
}

impl Field {
    /// Convert to the owned wire form used in `missing_fields` payloads.
    pub fn to_spec(&self) -> FieldSpec {
        FieldSpec {
            name: self.name.to_string(),
            field_type: self.field_type.to_string(),
            description: self.description.to_string(),
        }
    }
}

/// A catalogue entry describing one business entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityDescriptor {
    /// Logical entity name, used in tool parameters and decisions.
    pub name: &'static str,
    /// Backend table name.
    pub table_name: &'static str,
    /// Surface forms (Chinese and English) the resolver matches against.
    pub synonyms: &'static [&'static str],
    /// Fields a create/update must supply.
    pub required_fields: &'static [Field],
    /// Fields a create/update may supply.
    pub optional_fields: &'static [Field],
    /// Filters applied to unqualified reads, as (field, value) pairs.
    pub default_filters: &'static [(&'static str, &'static str)],
}

impl EntityDescriptor {
    /// Default filters as a JSON object for backend read calls.
    pub fn default_filters_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for (field, value) in self.default_filters {
            map.insert((*field).to_string(), serde_json::Value::String((*value).to_string()));
        }
        serde_json::Value::Object(map)
    }
}

/// Look up a descriptor by its logical name.
pub fn lookup(name: &str) -> Option<&'static EntityDescriptor> {
    CATALOG.iter().find(|d| d.name == name)
}

/// The full catalogue. Order is stable; the resolver ranks by match
/// quality, not position.
pub const CATALOG: &[EntityDescriptor] = &[
    EntityDescriptor {
        name: "students",
        table_name: "students",
        synonyms: &["学生", "幼儿", "小朋友", "孩子", "student", "child", "kid"],
        required_fields: &[
            Field { name: "name", field_type: "string", description: "Student full name" },
            Field { name: "gender", field_type: "string", description: "Student gender" },
            Field { name: "class_id", field_type: "id", description: "Class the student belongs to" },
        ],
        optional_fields: &[
            Field { name: "birth_date", field_type: "date", description: "Date of birth" },
            Field { name: "parent_id", field_type: "id", description: "Primary guardian" },
            Field { name: "allergies", field_type: "string", description: "Known allergies" },
        ],
        default_filters: &[("status", "active")],
    },
    EntityDescriptor {
        name: "teachers",
        table_name: "teachers",
        synonyms: &["教师", "老师", "teacher"],
        required_fields: &[
            Field { name: "name", field_type: "string", description: "Teacher full name" },
            Field { name: "phone", field_type: "string", description: "Contact phone number" },
        ],
        optional_fields: &[
            Field { name: "subject", field_type: "string", description: "Teaching subject" },
            Field { name: "class_id", field_type: "id", description: "Homeroom class" },
        ],
        default_filters: &[("status", "active")],
    },
    EntityDescriptor {
        name: "parents",
        table_name: "parents",
        synonyms: &["家长", "父母", "监护人", "parent", "guardian"],
        required_fields: &[
            Field { name: "name", field_type: "string", description: "Parent full name" },
            Field { name: "phone", field_type: "string", description: "Contact phone number" },
            Field { name: "student_id", field_type: "id", description: "Linked student" },
        ],
        optional_fields: &[
            Field { name: "relation", field_type: "string", description: "Relation to the student" },
        ],
        default_filters: &[],
    },
    EntityDescriptor {
        name: "classes",
        table_name: "classes",
        synonyms: &["班级", "班", "class"],
        required_fields: &[
            Field { name: "name", field_type: "string", description: "Class name" },
            Field { name: "kindergarten_id", field_type: "id", description: "Kindergarten the class belongs to" },
        ],
        optional_fields: &[
            Field { name: "head_teacher_id", field_type: "id", description: "Head teacher" },
            Field { name: "capacity", field_type: "number", description: "Maximum students" },
        ],
        default_filters: &[],
    },
    EntityDescriptor {
        name: "kindergartens",
        table_name: "kindergartens",
        synonyms: &["幼儿园", "园所", "园区", "kindergarten", "campus"],
        required_fields: &[
            Field { name: "name", field_type: "string", description: "Kindergarten name" },
            Field { name: "address", field_type: "string", description: "Street address" },
        ],
        optional_fields: &[
            Field { name: "phone", field_type: "string", description: "Front-desk phone" },
            Field { name: "principal", field_type: "string", description: "Principal name" },
        ],
        default_filters: &[],
    },
    EntityDescriptor {
        name: "enrollment_applications",
        table_name: "enrollment_applications",
        synonyms: &["报名", "入园申请", "招生", "enrollment", "application", "admission"],
        required_fields: &[
            Field { name: "student_name", field_type: "string", description: "Applicant child name" },
            Field { name: "parent_phone", field_type: "string", description: "Parent contact phone" },
            Field { name: "kindergarten_id", field_type: "id", description: "Target kindergarten" },
        ],
        optional_fields: &[
            Field { name: "notes", field_type: "string", description: "Free-form notes" },
        ],
        default_filters: &[("status", "pending")],
    },
    EntityDescriptor {
        name: "activities",
        table_name: "activities",
        synonyms: &["活动", "亲子活动", "activity", "event"],
        required_fields: &[
            Field { name: "title", field_type: "string", description: "Activity title" },
            Field { name: "start_date", field_type: "date", description: "Start date" },
            Field { name: "kindergarten_id", field_type: "id", description: "Hosting kindergarten" },
        ],
        optional_fields: &[
            Field { name: "location", field_type: "string", description: "Venue" },
            Field { name: "capacity", field_type: "number", description: "Maximum participants" },
        ],
        default_filters: &[],
    },
    EntityDescriptor {
        name: "activity_registrations",
        table_name: "activity_registrations",
        synonyms: &["活动报名", "报名记录", "registration", "signup"],
        required_fields: &[
            Field { name: "activity_id", field_type: "id", description: "Activity" },
            Field { name: "student_id", field_type: "id", description: "Registered student" },
        ],
        optional_fields: &[],
        default_filters: &[],
    },
    EntityDescriptor {
        name: "courses",
        table_name: "courses",
        synonyms: &["课程", "课", "course", "lesson"],
        required_fields: &[
            Field { name: "name", field_type: "string", description: "Course name" },
            Field { name: "teacher_id", field_type: "id", description: "Teacher in charge" },
        ],
        optional_fields: &[
            Field { name: "description", field_type: "string", description: "Course description" },
        ],
        default_filters: &[],
    },
    EntityDescriptor {
        name: "schedules",
        table_name: "schedules",
        synonyms: &["课表", "日程", "排课", "schedule", "timetable"],
        required_fields: &[
            Field { name: "class_id", field_type: "id", description: "Class" },
            Field { name: "course_id", field_type: "id", description: "Course" },
            Field { name: "weekday", field_type: "number", description: "Day of week (1-7)" },
            Field { name: "start_time", field_type: "string", description: "Start time (HH:MM)" },
        ],
        optional_fields: &[],
        default_filters: &[],
    },
    EntityDescriptor {
        name: "attendance",
        table_name: "attendance_records",
        synonyms: &["考勤", "出勤", "签到", "attendance", "check-in"],
        required_fields: &[
            Field { name: "student_id", field_type: "id", description: "Student" },
            Field { name: "date", field_type: "date", description: "Attendance date" },
            Field { name: "status", field_type: "string", description: "present / absent / late" },
        ],
        optional_fields: &[],
        default_filters: &[],
    },
    EntityDescriptor {
        name: "health_records",
        table_name: "health_records",
        synonyms: &["健康记录", "体检", "健康档案", "health record", "checkup"],
        required_fields: &[
            Field { name: "student_id", field_type: "id", description: "Student" },
            Field { name: "record_date", field_type: "date", description: "Record date" },
            Field { name: "record_type", field_type: "string", description: "Type of record" },
        ],
        optional_fields: &[
            Field { name: "notes", field_type: "string", description: "Clinical notes" },
        ],
        default_filters: &[],
    },
    EntityDescriptor {
        name: "vaccinations",
        table_name: "vaccinations",
        synonyms: &["疫苗", "接种", "vaccination", "vaccine"],
        required_fields: &[
            Field { name: "student_id", field_type: "id", description: "Student" },
            Field { name: "vaccine_name", field_type: "string", description: "Vaccine name" },
            Field { name: "date", field_type: "date", description: "Administration date" },
        ],
        optional_fields: &[],
        default_filters: &[],
    },
    EntityDescriptor {
        name: "meals",
        table_name: "meal_plans",
        synonyms: &["食谱", "餐食", "菜单", "meal", "menu", "recipe"],
        required_fields: &[
            Field { name: "date", field_type: "date", description: "Menu date" },
            Field { name: "meal_type", field_type: "string", description: "breakfast / lunch / snack" },
            Field { name: "menu", field_type: "string", description: "Dishes served" },
        ],
        optional_fields: &[],
        default_filters: &[],
    },
    EntityDescriptor {
        name: "fees",
        table_name: "fees",
        synonyms: &["收费", "费用", "学费", "fee", "tuition"],
        required_fields: &[
            Field { name: "student_id", field_type: "id", description: "Billed student" },
            Field { name: "fee_type", field_type: "string", description: "Fee category" },
            Field { name: "amount", field_type: "number", description: "Amount due" },
        ],
        optional_fields: &[
            Field { name: "due_date", field_type: "date", description: "Payment deadline" },
        ],
        default_filters: &[("status", "unpaid")],
    },
    EntityDescriptor {
        name: "payments",
        table_name: "payments",
        synonyms: &["缴费", "支付", "付款", "payment"],
        required_fields: &[
            Field { name: "fee_id", field_type: "id", description: "Fee being paid" },
            Field { name: "amount", field_type: "number", description: "Amount paid" },
            Field { name: "paid_at", field_type: "date", description: "Payment date" },
        ],
        optional_fields: &[],
        default_filters: &[],
    },
    EntityDescriptor {
        name: "invoices",
        table_name: "invoices",
        synonyms: &["发票", "账单", "invoice", "bill"],
        required_fields: &[
            Field { name: "payment_id", field_type: "id", description: "Underlying payment" },
            Field { name: "title", field_type: "string", description: "Invoice title" },
        ],
        optional_fields: &[],
        default_filters: &[],
    },
    EntityDescriptor {
        name: "salaries",
        table_name: "salaries",
        synonyms: &["工资", "薪资", "薪酬", "salary", "payroll"],
        required_fields: &[
            Field { name: "staff_id", field_type: "id", description: "Staff member" },
            Field { name: "month", field_type: "string", description: "Salary month (YYYY-MM)" },
            Field { name: "amount", field_type: "number", description: "Gross amount" },
        ],
        optional_fields: &[],
        default_filters: &[],
    },
    EntityDescriptor {
        name: "staff",
        table_name: "staff",
        synonyms: &["员工", "职工", "staff", "employee"],
        required_fields: &[
            Field { name: "name", field_type: "string", description: "Staff full name" },
            Field { name: "role_title", field_type: "string", description: "Job title" },
        ],
        optional_fields: &[
            Field { name: "phone", field_type: "string", description: "Contact phone" },
        ],
        default_filters: &[("status", "active")],
    },
    EntityDescriptor {
        name: "users",
        table_name: "users",
        synonyms: &["用户", "账号", "user", "account"],
        required_fields: &[
            Field { name: "username", field_type: "string", description: "Login name" },
            Field { name: "role", field_type: "string", description: "System role" },
        ],
        optional_fields: &[
            Field { name: "email", field_type: "string", description: "Email address" },
        ],
        default_filters: &[],
    },
    EntityDescriptor {
        name: "roles",
        table_name: "roles",
        synonyms: &["角色", "权限", "role", "permission"],
        required_fields: &[
            Field { name: "name", field_type: "string", description: "Role name" },
        ],
        optional_fields: &[
            Field { name: "permissions", field_type: "string", description: "Permission list" },
        ],
        default_filters: &[],
    },
    EntityDescriptor {
        name: "notifications",
        table_name: "notifications",
        synonyms: &["通知", "提醒", "notification", "reminder"],
        required_fields: &[
            Field { name: "recipient_id", field_type: "id", description: "Recipient user" },
            Field { name: "content", field_type: "string", description: "Notification body" },
        ],
        optional_fields: &[],
        default_filters: &[("read", "false")],
    },
    EntityDescriptor {
        name: "announcements",
        table_name: "announcements",
        synonyms: &["公告", "通告", "announcement", "notice"],
        required_fields: &[
            Field { name: "title", field_type: "string", description: "Announcement title" },
            Field { name: "content", field_type: "string", description: "Announcement body" },
            Field { name: "kindergarten_id", field_type: "id", description: "Publishing kindergarten" },
        ],
        optional_fields: &[],
        default_filters: &[],
    },
    EntityDescriptor {
        name: "documents",
        table_name: "documents",
        synonyms: &["文档", "资料", "文件", "document", "file"],
        required_fields: &[
            Field { name: "title", field_type: "string", description: "Document title" },
            Field { name: "file_url", field_type: "string", description: "Storage URL" },
        ],
        optional_fields: &[
            Field { name: "category", field_type: "string", description: "Document category" },
        ],
        default_filters: &[],
    },
    EntityDescriptor {
        name: "assets",
        table_name: "assets",
        synonyms: &["资产", "设备", "物资", "asset", "equipment"],
        required_fields: &[
            Field { name: "name", field_type: "string", description: "Asset name" },
            Field { name: "category", field_type: "string", description: "Asset category" },
        ],
        optional_fields: &[
            Field { name: "location", field_type: "string", description: "Storage location" },
        ],
        default_filters: &[],
    },
    EntityDescriptor {
        name: "marketing_campaigns",
        table_name: "marketing_campaigns",
        synonyms: &["营销活动", "推广", "campaign", "marketing"],
        required_fields: &[
            Field { name: "name", field_type: "string", description: "Campaign name" },
            Field { name: "start_date", field_type: "date", description: "Launch date" },
        ],
        optional_fields: &[
            Field { name: "budget", field_type: "number", description: "Campaign budget" },
        ],
        default_filters: &[],
    },
    EntityDescriptor {
        name: "customer_leads",
        table_name: "customer_leads",
        synonyms: &["客户", "线索", "潜在客户", "lead", "prospect"],
        required_fields: &[
            Field { name: "name", field_type: "string", description: "Contact name" },
            Field { name: "phone", field_type: "string", description: "Contact phone" },
        ],
        optional_fields: &[
            Field { name: "source", field_type: "string", description: "Acquisition source" },
        ],
        default_filters: &[("status", "new")],
    },
    EntityDescriptor {
        name: "follow_ups",
        table_name: "follow_ups",
        synonyms: &["跟进", "回访", "follow-up", "follow up"],
        required_fields: &[
            Field { name: "lead_id", field_type: "id", description: "Lead being followed up" },
            Field { name: "content", field_type: "string", description: "Follow-up notes" },
            Field { name: "follow_up_at", field_type: "date", description: "Follow-up date" },
        ],
        optional_fields: &[],
        default_filters: &[],
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalogue_names_are_unique() {
        let mut names: Vec<&str> = CATALOG.iter().map(|d| d.name).collect();
        let before = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), before, "duplicate entity names in catalogue");
    }

    #[test]
    fn catalogue_covers_expected_breadth() {
        assert!(CATALOG.len() >= 26, "catalogue has {} entries", CATALOG.len());
    }

    #[test]
    fn every_entity_has_synonyms_and_required_fields() {
        for descriptor in CATALOG {
            assert!(!descriptor.synonyms.is_empty(), "{} has no synonyms", descriptor.name);
            assert!(
                !descriptor.required_fields.is_empty(),
                "{} has no required fields",
                descriptor.name
            );
        }
    }

    #[test]
    fn lookup_by_name() {
        let students = lookup("students").unwrap();
        assert_eq!(students.table_name, "students");
        assert!(lookup("spaceships").is_none());
    }

    #[test]
    fn class_requires_kindergarten() {
        let classes = lookup("classes").unwrap();
        let required: Vec<&str> = classes.required_fields.iter().map(|f| f.name).collect();
        assert!(required.contains(&"name"));
        assert!(required.contains(&"kindergarten_id"));
    }

    #[test]
    fn default_filters_to_json() {
        let students = lookup("students").unwrap();
        let filters = students.default_filters_json();
        assert_eq!(filters["status"], "active");

        let classes = lookup("classes").unwrap();
        assert_eq!(classes.default_filters_json(), serde_json::json!({}));
    }

    #[test]
    fn field_to_spec_owns_strings() {
        let field = Field {
            name: "name",
            field_type: "string",
            description: "Class name",
        };
        let spec = field.to_spec();
        assert_eq!(spec.name, "name");
        assert_eq!(spec.field_type, "string");
    }
}
