//! Request validation schemas.
//!
//! Each form is a `validator`-derived struct deserialized straight from the
//! JSON body. Every struct uses `#[serde(default)]` so a missing field turns
//! into a field-level message instead of a deserialization failure. Messages
//! are user-facing and written in Portuguese.
//!
//! Call [`validate_form`] after normalizing the input to turn
//! `validator`'s error tree into [`CoreError::InvalidFields`].

use serde::Deserialize;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::error::{CoreError, FieldError};
use crate::types::DbId;

pub const MSG_NAME_LENGTH: &str = "O nome deve ter entre 2 e 100 caracteres";
pub const MSG_EMAIL_INVALID: &str = "Informe um e-mail válido";
pub const MSG_PASSWORD_LENGTH: &str = "A senha deve ter entre 8 e 128 caracteres";
pub const MSG_PASSWORD_MIX: &str = "A senha deve conter letras e números";
pub const MSG_PASSWORD_MISMATCH: &str = "As senhas não coincidem";
pub const MSG_PASSWORD_REQUIRED: &str = "A senha é obrigatória";
pub const MSG_CURRENT_PASSWORD_REQUIRED: &str = "A senha atual é obrigatória";
pub const MSG_CURRENT_PASSWORD_WRONG: &str = "A senha atual está incorreta";
pub const MSG_PASSWORD_UNCHANGED: &str = "A nova senha deve ser diferente da atual";
pub const MSG_TOKEN_REQUIRED: &str = "O token é obrigatório";
pub const MSG_TOKEN_INVALID: &str = "Token inválido ou expirado";
pub const MSG_REFRESH_REQUIRED: &str = "O refresh token é obrigatório";
pub const MSG_SESSION_INVALID: &str = "Sessão inválida";
pub const MSG_PLAN_INVALID: &str = "Plano inválido";
pub const MSG_COUPON_INVALID: &str = "Cupom inválido ou expirado";
pub const MSG_COUPON_CODE_LENGTH: &str = "O código do cupom deve ter entre 3 e 64 caracteres";
pub const MSG_PAYMENT_METHOD_INVALID: &str = "Forma de pagamento inválida";
pub const MSG_CARD_BRAND: &str = "Informe a bandeira do cartão";
pub const MSG_CARD_LAST4: &str = "Informe os 4 últimos dígitos do cartão";
pub const MSG_CARD_EXP_MONTH: &str = "Mês de validade inválido";
pub const MSG_CARD_EXP_YEAR: &str = "Ano de validade inválido";
pub const MSG_CARD_EXPIRED: &str = "O cartão está vencido";
pub const MSG_PLAN_CODE: &str = "O código do plano deve ter entre 2 e 50 caracteres";
pub const MSG_PLAN_NAME: &str = "O nome do plano deve ter entre 2 e 100 caracteres";
pub const MSG_PRICE_NEGATIVE: &str = "O preço não pode ser negativo";
pub const MSG_CURRENCY: &str = "A moeda deve ter 3 letras (ISO 4217)";
pub const MSG_INTERVAL: &str = "A recorrência deve ser \"month\" ou \"year\"";
pub const MSG_TRIAL_DAYS: &str = "O período de teste deve ter entre 0 e 365 dias";
pub const MSG_DISCOUNT: &str = "Informe exatamente um desconto: percentual (1-100) ou valor fixo";
pub const MSG_MAX_REDEMPTIONS: &str = "O limite de usos deve ser positivo";

// ---------------------------------------------------------------------------
// Auth forms
// ---------------------------------------------------------------------------

/// Body of `POST /auth/register`.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(default)]
pub struct RegisterForm {
    #[validate(length(min = 2, max = 100, message = "O nome deve ter entre 2 e 100 caracteres"))]
    pub name: String,
    #[validate(email(message = "Informe um e-mail válido"))]
    pub email: String,
    #[validate(
        length(min = 8, max = 128, message = "A senha deve ter entre 8 e 128 caracteres"),
        custom(function = "password_mix")
    )]
    pub password: String,
    #[validate(must_match(other = "password", message = "As senhas não coincidem"))]
    pub confirm_password: String,
}

impl RegisterForm {
    pub fn normalized(mut self) -> Self {
        self.name = self.name.trim().to_string();
        self.email = normalize_email(&self.email);
        self
    }
}

/// Body of `POST /auth/login`.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(default)]
pub struct LoginForm {
    #[validate(email(message = "Informe um e-mail válido"))]
    pub email: String,
    #[validate(length(min = 1, message = "A senha é obrigatória"))]
    pub password: String,
}

impl LoginForm {
    pub fn normalized(mut self) -> Self {
        self.email = normalize_email(&self.email);
        self
    }
}

/// Body of `POST /auth/forgot-password`.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(default)]
pub struct ForgotPasswordForm {
    #[validate(email(message = "Informe um e-mail válido"))]
    pub email: String,
}

impl ForgotPasswordForm {
    pub fn normalized(mut self) -> Self {
        self.email = normalize_email(&self.email);
        self
    }
}

/// Body of `POST /auth/reset-password`.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(default)]
pub struct ResetPasswordForm {
    #[validate(length(min = 1, message = "O token é obrigatório"))]
    pub token: String,
    #[validate(
        length(min = 8, max = 128, message = "A senha deve ter entre 8 e 128 caracteres"),
        custom(function = "password_mix")
    )]
    pub password: String,
    #[validate(must_match(other = "password", message = "As senhas não coincidem"))]
    pub confirm_password: String,
}

/// Body of `POST /auth/change-password`.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(default)]
pub struct ChangePasswordForm {
    #[validate(length(min = 1, message = "A senha atual é obrigatória"))]
    pub current_password: String,
    #[validate(
        length(min = 8, max = 128, message = "A senha deve ter entre 8 e 128 caracteres"),
        custom(function = "password_mix")
    )]
    pub new_password: String,
    #[validate(must_match(other = "new_password", message = "As senhas não coincidem"))]
    pub confirm_password: String,
}

/// Body of `POST /auth/refresh-token`.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(default)]
pub struct RefreshTokenForm {
    #[validate(length(min = 1, message = "O refresh token é obrigatório"))]
    pub refresh_token: String,
}

/// Body of `POST /auth/verify-email`.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(default)]
pub struct VerifyEmailForm {
    #[validate(length(min = 1, message = "O token é obrigatório"))]
    pub token: String,
}

/// Body of `POST /auth/revoke-session`.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(default)]
pub struct RevokeSessionForm {
    #[validate(range(min = 1, message = "Sessão inválida"))]
    pub session_id: DbId,
}

// ---------------------------------------------------------------------------
// Billing forms
// ---------------------------------------------------------------------------

/// Body of `POST /billing/subscription`.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(default)]
pub struct SubscribeForm {
    #[validate(range(min = 1, message = "Plano inválido"))]
    pub plan_id: DbId,
    #[validate(length(min = 3, max = 64, message = "O código do cupom deve ter entre 3 e 64 caracteres"))]
    pub coupon_code: Option<String>,
    #[validate(range(min = 1, message = "Forma de pagamento inválida"))]
    pub payment_method_id: Option<DbId>,
}

/// Body of `POST /billing/subscription/change-plan`.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(default)]
pub struct ChangePlanForm {
    #[validate(range(min = 1, message = "Plano inválido"))]
    pub plan_id: DbId,
}

/// Body of `POST /billing/subscription/cancel`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CancelSubscriptionForm {
    pub at_period_end: bool,
}

impl Default for CancelSubscriptionForm {
    fn default() -> Self {
        Self {
            at_period_end: true,
        }
    }
}

/// Body of `POST /billing/coupons/validate`.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(default)]
pub struct ValidateCouponForm {
    #[validate(length(min = 3, max = 64, message = "O código do cupom deve ter entre 3 e 64 caracteres"))]
    pub code: String,
    #[validate(range(min = 1, message = "Plano inválido"))]
    pub plan_id: DbId,
}

/// Body of `POST /billing/invoices/{id}/pay`.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(default)]
pub struct PayInvoiceForm {
    #[validate(range(min = 1, message = "Forma de pagamento inválida"))]
    pub payment_method_id: Option<DbId>,
}

/// Body of `POST /billing/payment-methods`.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(default)]
pub struct AddPaymentMethodForm {
    #[validate(length(min = 1, max = 32, message = "Informe a bandeira do cartão"))]
    pub brand: String,
    #[validate(custom(function = "card_last4"))]
    pub last4: String,
    #[validate(range(min = 1, max = 12, message = "Mês de validade inválido"))]
    pub exp_month: i32,
    #[validate(range(min = 2000, max = 2100, message = "Ano de validade inválido"))]
    pub exp_year: i32,
    pub make_default: bool,
}

/// Body of `POST /admin/plans`.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(default)]
pub struct CreatePlanForm {
    #[validate(length(min = 2, max = 50, message = "O código do plano deve ter entre 2 e 50 caracteres"))]
    pub code: String,
    #[validate(length(min = 2, max = 100, message = "O nome do plano deve ter entre 2 e 100 caracteres"))]
    pub name: String,
    pub description: Option<String>,
    #[validate(range(min = 0, message = "O preço não pode ser negativo"))]
    pub price_cents: i64,
    #[validate(custom(function = "currency_code"))]
    pub currency: String,
    #[validate(custom(function = "plan_interval"))]
    pub interval: String,
    #[validate(range(min = 0, max = 365, message = "O período de teste deve ter entre 0 e 365 dias"))]
    pub trial_days: i32,
    pub features: Vec<String>,
}

/// Body of `PUT /admin/plans/{id}`. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(default)]
pub struct UpdatePlanForm {
    #[validate(length(min = 2, max = 100, message = "O nome do plano deve ter entre 2 e 100 caracteres"))]
    pub name: Option<String>,
    pub description: Option<String>,
    #[validate(range(min = 0, message = "O preço não pode ser negativo"))]
    pub price_cents: Option<i64>,
    #[validate(range(min = 0, max = 365, message = "O período de teste deve ter entre 0 e 365 dias"))]
    pub trial_days: Option<i32>,
    pub features: Option<Vec<String>>,
    pub is_active: Option<bool>,
}

/// Body of `POST /admin/coupons`.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(default)]
#[validate(schema(function = "single_discount"))]
pub struct CreateCouponForm {
    #[validate(length(min = 3, max = 64, message = "O código do cupom deve ter entre 3 e 64 caracteres"))]
    pub code: String,
    pub percent_off: Option<i32>,
    pub amount_off_cents: Option<i64>,
    #[validate(range(min = 1, message = "O limite de usos deve ser positivo"))]
    pub max_redemptions: Option<i32>,
    pub valid_until: Option<crate::types::Timestamp>,
}

impl CreateCouponForm {
    pub fn normalized(mut self) -> Self {
        self.code = normalize_coupon_code(&self.code);
        self
    }
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Emails are compared case-insensitively and stored lowercased.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Coupon codes are stored uppercased without surrounding whitespace.
pub fn normalize_coupon_code(code: &str) -> String {
    code.trim().to_uppercase()
}

// ---------------------------------------------------------------------------
// Custom rules
// ---------------------------------------------------------------------------

fn password_mix(value: &str) -> Result<(), ValidationError> {
    let has_letter = value.chars().any(char::is_alphabetic);
    let has_digit = value.chars().any(|c| c.is_ascii_digit());
    if value.is_empty() || (has_letter && has_digit) {
        return Ok(());
    }
    Err(ValidationError::new("password_mix").with_message(MSG_PASSWORD_MIX.into()))
}

fn card_last4(value: &str) -> Result<(), ValidationError> {
    if value.len() == 4 && value.chars().all(|c| c.is_ascii_digit()) {
        return Ok(());
    }
    Err(ValidationError::new("last4").with_message(MSG_CARD_LAST4.into()))
}

fn currency_code(value: &str) -> Result<(), ValidationError> {
    if value.len() == 3 && value.chars().all(|c| c.is_ascii_alphabetic()) {
        return Ok(());
    }
    Err(ValidationError::new("currency").with_message(MSG_CURRENCY.into()))
}

fn plan_interval(value: &str) -> Result<(), ValidationError> {
    if crate::billing::PlanInterval::parse(value).is_some() {
        return Ok(());
    }
    Err(ValidationError::new("interval").with_message(MSG_INTERVAL.into()))
}

fn single_discount(form: &CreateCouponForm) -> Result<(), ValidationError> {
    let ok = match (form.percent_off, form.amount_off_cents) {
        (Some(pct), None) => (1..=100).contains(&pct),
        (None, Some(amount)) => amount > 0,
        _ => false,
    };
    if ok {
        return Ok(());
    }
    Err(ValidationError::new("discount").with_message(MSG_DISCOUNT.into()))
}

/// Reject cards whose expiration month is already behind `now`.
pub fn check_card_not_expired(
    exp_year: i32,
    exp_month: i32,
    now: crate::types::Timestamp,
) -> Result<(), CoreError> {
    if !crate::billing::card_valid_on(exp_year, exp_month, now) {
        return Err(CoreError::field("exp_year", MSG_CARD_EXPIRED));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Error conversion
// ---------------------------------------------------------------------------

/// Run a form's validation rules and collect the failures as field errors.
pub fn validate_form<T: Validate>(form: &T) -> Result<(), CoreError> {
    form.validate()
        .map_err(|errors| CoreError::InvalidFields(flatten_errors(&errors)))
}

/// Flatten `validator`'s error tree into a stable, sorted list.
///
/// Struct-level (schema) failures are reported under the `"__all__"` key, the
/// same key `validator` itself uses for them.
pub fn flatten_errors(errors: &ValidationErrors) -> Vec<FieldError> {
    let mut out: Vec<FieldError> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| {
                let message = e
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("Valor inválido ({})", e.code));
                FieldError::new(field.to_string(), message)
            })
        })
        .collect();
    out.sort_by(|a, b| a.field.cmp(&b.field));
    out
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn register(name: &str, email: &str, pw: &str, confirm: &str) -> RegisterForm {
        RegisterForm {
            name: name.into(),
            email: email.into(),
            password: pw.into(),
            confirm_password: confirm.into(),
        }
    }

    fn messages_for(err: &CoreError, field: &str) -> Vec<String> {
        match err {
            CoreError::InvalidFields(fields) => fields
                .iter()
                .filter(|f| f.field == field)
                .map(|f| f.message.clone())
                .collect(),
            other => panic!("expected InvalidFields, got {other:?}"),
        }
    }

    #[test]
    fn valid_registration_passes() {
        let form = register("Ana", "ana@example.com", "segredo123", "segredo123");
        assert!(validate_form(&form).is_ok());
    }

    #[test]
    fn registration_reports_each_field() {
        let form = register("A", "not-an-email", "short", "other");
        let err = validate_form(&form).unwrap_err();
        let CoreError::InvalidFields(fields) = err else {
            panic!("expected field errors");
        };
        let names: Vec<&str> = fields.iter().map(|f| f.field.as_str()).collect();
        assert!(names.contains(&"name"));
        assert!(names.contains(&"email"));
        assert!(names.contains(&"password"));
        assert!(names.contains(&"confirm_password"));
    }

    #[test]
    fn password_without_digits_is_rejected() {
        let form = register("Ana", "ana@example.com", "somenteletras", "somenteletras");
        let msgs = messages_for(&validate_form(&form).unwrap_err(), "password");
        assert_eq!(msgs, vec![MSG_PASSWORD_MIX.to_string()]);
    }

    #[test]
    fn mismatched_confirmation_is_rejected() {
        let form = register("Ana", "ana@example.com", "segredo123", "segredo124");
        let msgs = messages_for(&validate_form(&form).unwrap_err(), "confirm_password");
        assert_eq!(msgs, vec![MSG_PASSWORD_MISMATCH.to_string()]);
    }

    #[test]
    fn missing_fields_deserialize_to_validation_errors() {
        let form: LoginForm = serde_json::from_str("{}").unwrap();
        let err = validate_form(&form).unwrap_err();
        assert_eq!(messages_for(&err, "password"), vec![MSG_PASSWORD_REQUIRED]);
    }

    #[test]
    fn registration_messages_match_constants() {
        let form = register("A", "not-an-email", "short1", "short1");
        let err = validate_form(&form).unwrap_err();
        assert_eq!(messages_for(&err, "name"), vec![MSG_NAME_LENGTH]);
        assert_eq!(messages_for(&err, "email"), vec![MSG_EMAIL_INVALID]);
        assert_eq!(messages_for(&err, "password"), vec![MSG_PASSWORD_LENGTH]);
    }

    #[test]
    fn register_normalizes_email_and_name() {
        let form = register("  Ana  ", " Ana@Example.COM ", "x", "x").normalized();
        assert_eq!(form.name, "Ana");
        assert_eq!(form.email, "ana@example.com");
    }

    #[test]
    fn cancel_defaults_to_period_end() {
        let form: CancelSubscriptionForm = serde_json::from_str("{}").unwrap();
        assert!(form.at_period_end);
    }

    #[test]
    fn coupon_needs_exactly_one_discount() {
        let both = CreateCouponForm {
            code: "PROMO10".into(),
            percent_off: Some(10),
            amount_off_cents: Some(500),
            ..Default::default()
        };
        assert_matches!(validate_form(&both), Err(CoreError::InvalidFields(_)));

        let pct = CreateCouponForm {
            code: "PROMO10".into(),
            percent_off: Some(10),
            ..Default::default()
        };
        assert!(validate_form(&pct).is_ok());

        let too_much = CreateCouponForm {
            code: "PROMO".into(),
            percent_off: Some(150),
            ..Default::default()
        };
        assert_matches!(validate_form(&too_much), Err(CoreError::InvalidFields(_)));
    }

    #[test]
    fn card_fields_are_checked() {
        let form = AddPaymentMethodForm {
            brand: "visa".into(),
            last4: "42a2".into(),
            exp_month: 13,
            exp_year: 2030,
            make_default: false,
        };
        let CoreError::InvalidFields(fields) = validate_form(&form).unwrap_err() else {
            panic!("expected field errors");
        };
        let names: Vec<&str> = fields.iter().map(|f| f.field.as_str()).collect();
        assert_eq!(names, vec!["exp_month", "last4"]);
    }

    #[test]
    fn card_messages_match_constants() {
        let form = AddPaymentMethodForm {
            brand: String::new(),
            last4: "4242".into(),
            exp_month: 0,
            exp_year: 1999,
            make_default: false,
        };
        let err = validate_form(&form).unwrap_err();
        assert_eq!(messages_for(&err, "brand"), vec![MSG_CARD_BRAND]);
        assert_eq!(messages_for(&err, "exp_month"), vec![MSG_CARD_EXP_MONTH]);
        assert_eq!(messages_for(&err, "exp_year"), vec![MSG_CARD_EXP_YEAR]);
    }

    #[test]
    fn expired_card_is_rejected() {
        use chrono::TimeZone;
        let today = chrono::Utc.with_ymd_and_hms(2026, 5, 10, 9, 0, 0).unwrap();
        assert!(check_card_not_expired(2026, 5, today).is_ok());
        assert!(check_card_not_expired(2027, 1, today).is_ok());
        assert_matches!(
            check_card_not_expired(2026, 4, today),
            Err(CoreError::InvalidFields(_))
        );
    }

    #[test]
    fn plan_form_checks_interval_and_currency() {
        let form = CreatePlanForm {
            code: "pro".into(),
            name: "Pro".into(),
            price_cents: 4900,
            currency: "BRL".into(),
            interval: "week".into(),
            ..Default::default()
        };
        let msgs = messages_for(&validate_form(&form).unwrap_err(), "interval");
        assert_eq!(msgs, vec![MSG_INTERVAL]);
    }

    #[test]
    fn admin_form_messages_match_constants() {
        let plan = CreatePlanForm {
            code: "p".into(),
            name: "P".into(),
            price_cents: -1,
            currency: "BRL".into(),
            interval: "month".into(),
            trial_days: 400,
            ..Default::default()
        };
        let err = validate_form(&plan).unwrap_err();
        assert_eq!(messages_for(&err, "code"), vec![MSG_PLAN_CODE]);
        assert_eq!(messages_for(&err, "name"), vec![MSG_PLAN_NAME]);
        assert_eq!(messages_for(&err, "price_cents"), vec![MSG_PRICE_NEGATIVE]);
        assert_eq!(messages_for(&err, "trial_days"), vec![MSG_TRIAL_DAYS]);

        let coupon = CreateCouponForm {
            code: "AB".into(),
            percent_off: Some(10),
            max_redemptions: Some(0),
            ..Default::default()
        };
        let err = validate_form(&coupon).unwrap_err();
        assert_eq!(messages_for(&err, "code"), vec![MSG_COUPON_CODE_LENGTH]);
        assert_eq!(messages_for(&err, "max_redemptions"), vec![MSG_MAX_REDEMPTIONS]);
    }
}
