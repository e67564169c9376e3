table! {
    users (id) {
        id -> BigInt,
        phone -> Text,
        password_hash -> Nullable<Text>,
        is_admin -> Bool,
    }
}

table! {
    businesses (code) {
        code -> Text,
        name -> Text,
        image -> Nullable<Text>,
        owner_id -> BigInt,
    }
}

table! {
    clients (user_id, business_code) {
        user_id -> BigInt,
        business_code -> Text,
        first_name -> Text,
        last_name -> Nullable<Text>,
        bonuses -> Double,
        image -> Nullable<Text>,
        is_staff -> Bool,
        qr_code -> Text,
        deleted -> Bool,
        deleted_at -> Nullable<Timestamp>,
    }
}

table! {
    otps (id) {
        id -> BigInt,
        phone -> Text,
        business_code -> Nullable<Text>,
        realm -> Text,
        code -> Text,
        sent_at -> Timestamp,
        expires_at -> Timestamp,
        used -> Bool,
        revoked -> Bool,
    }
}

table! {
    access_tokens (jti) {
        jti -> Uuid,
        user_id -> BigInt,
        realm -> Text,
        business_code -> Nullable<Text>,
        ip_address -> Nullable<Text>,
        user_agent -> Nullable<Text>,
        issued_at -> Timestamp,
        expires_at -> Timestamp,
        revoked -> Bool,
        refresh_token_jti -> Nullable<Uuid>,
    }
}

table! {
    refresh_tokens (jti) {
        jti -> Uuid,
        user_id -> BigInt,
        realm -> Text,
        business_code -> Nullable<Text>,
        issued_at -> Timestamp,
        expires_at -> Timestamp,
        revoked -> Bool,
        access_token_jti -> Nullable<Uuid>,
    }
}

allow_tables_to_appear_in_same_query!(users, businesses, clients, otps, access_tokens, refresh_tokens,);
