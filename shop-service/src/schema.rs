diesel::table! {
    orders (order_id) {
        order_id -> Int8,
        user_id -> Int8,
        product_id -> Int8,
        quantity -> Int4,
        #[sql_name = "sum"]
        total -> Numeric,
        status -> Varchar,
        #[sql_name = "time"]
        created_at -> Timestamptz,
        updated_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    products (product_id) {
        product_id -> Int8,
        name -> Varchar,
        price -> Numeric,
        stock -> Int4,
    }
}

diesel::joinable!(orders -> products (product_id));

diesel::allow_tables_to_appear_in_same_query!(
    orders,
    products,
);
